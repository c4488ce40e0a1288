use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::error::{Result, StoreError};
use crate::store::pool::Pool;

/// Zero-padding width of version directory names.
pub const VERSION_NUM_DIGITS: usize = 4;
/// Design maximum; reserving past this fails with VersionOverflow.
pub const MAX_VERSION: u32 = 9999;

/// Parse a `vNNNN` directory name. Any digit width >= 1 is accepted.
pub fn parse_version_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix('v')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Format a version number as `vNNNN`, widening past four digits.
pub fn format_version_name(num: u32) -> String {
    format!("v{:0width$}", num, width = VERSION_NUM_DIGITS)
}

/// One reserved version directory inside an asset. Created only by the
/// reservation protocol; populated once; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Version {
    name: String,
    num: u32,
    dir: PathBuf,
}

impl Version {
    pub(crate) fn new(asset_d: &Path, num: u32) -> Version {
        let name = format_version_name(num);
        let dir = asset_d.join(&name);
        Version { name, num, dir }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u32 {
        self.num
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy a source tree (or single file) into this version through the
    /// pool. Files whose base name matches a skip pattern are omitted.
    /// Returns the relative paths stored.
    pub fn populate(
        &self,
        pool: &mut Pool,
        source: &Path,
        skip_patterns: &[Regex],
        verify: bool,
    ) -> Result<Vec<PathBuf>> {
        if !source.exists() {
            return Err(StoreError::SourceMissing(source.to_path_buf()));
        }

        let mut stored = Vec::new();

        if !source.is_dir() {
            let file_n = source
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| StoreError::SourceMissing(source.to_path_buf()))?;
            if !matches_any(skip_patterns, file_n) {
                pool.store(source, &self.dir.join(file_n), verify)?;
                stored.push(PathBuf::from(file_n));
            }
            return Ok(stored);
        }

        for entry in WalkDir::new(source).follow_links(false) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() {
                continue;
            }
            let file_n = entry.file_name().to_string_lossy();
            if matches_any(skip_patterns, &file_n) {
                tracing::debug!("skipping {} (matches skip pattern)", entry.path().display());
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(source)
                .expect("walk entries stay under the source root");
            pool.store(entry.path(), &self.dir.join(rel), verify)?;
            stored.push(rel.to_path_buf());
        }
        Ok(stored)
    }

    /// Carry forward entries from the previous version that this version
    /// does not already provide. Must run after populate so the new
    /// files win on name collisions. The literal (relative) link target
    /// is replicated, so the pool gains no data and the asset stays
    /// relocatable. Returns the relative paths merged.
    pub fn merge_from(&self, prev_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut merged = Vec::new();
        if !prev_dir.is_dir() {
            return Ok(merged);
        }
        for entry in WalkDir::new(prev_dir).follow_links(false) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(prev_dir)
                .expect("walk entries stay under the previous version");
            let dest_p = self.dir.join(rel);
            if dest_p.symlink_metadata().is_ok() {
                continue;
            }
            if let Some(parent) = dest_p.parent() {
                fs::create_dir_all(parent)?;
            }
            if entry.path_is_symlink() {
                let target = fs::read_link(entry.path())?;
                symlink(&target, &dest_p)?;
            } else {
                // stragglers that somehow are not links are byte-copied
                fs::copy(entry.path(), &dest_p)?;
            }
            merged.push(rel.to_path_buf());
        }
        Ok(merged)
    }

    /// All file entries (recursive) in this version directory, as paths
    /// relative to it.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !self.dir.is_dir() {
            return Ok(files);
        }
        for entry in WalkDir::new(&self.dir).follow_links(false) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() {
                continue;
            }
            files.push(
                entry
                    .path()
                    .strip_prefix(&self.dir)
                    .expect("walk entries stay under the version dir")
                    .to_path_buf(),
            );
        }
        files.sort();
        Ok(files)
    }
}

fn matches_any(patterns: &[Regex], name: &str) -> bool {
    patterns.iter().any(|p| p.is_match(name))
}
