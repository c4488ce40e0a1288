//! The asset coordinator.
//!
//! An asset is a directory holding an `.asset` marker, numbered version
//! directories whose files are symlinks into the `.data` pool, parallel
//! `.vNNNN` metadata sidecars, pin symlinks, and the two pools. This
//! module owns the directory layout, the race-safe version reservation,
//! publishing, and the destructive operations.
//!
//! Concurrency: the filesystem's atomic `mkdir` and `rename` are the
//! only locks. Concurrent publishes to one asset are safe; a publish
//! racing a delete-version or collapse is not, and callers must
//! serialize destructive operations externally.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::store::meta::Sidecar;
use crate::store::pool::Pool;
use crate::store::version::{self, Version, MAX_VERSION};
use crate::store::{pin, thumbnails};

/// Marker file whose presence makes a directory an asset.
pub const ASSET_MARKER: &str = ".asset";
const DATA_DIR: &str = ".data";
const THUMBNAIL_DATA_DIR: &str = ".thumbnaildata";
const METADATA_LINK: &str = ".metadata";
const RESERVE_ATTEMPTS: u32 = 100;

/// Everything one publish brings into a new version.
#[derive(Debug)]
pub struct PublishRequest {
    /// File or directory to store. A single file is a one-entry tree.
    pub source: PathBuf,
    pub keyvalues: BTreeMap<String, String>,
    pub keywords: Vec<String>,
    pub notes: Option<String>,
    pub thumbnails: Vec<PathBuf>,
    /// Which thumbnail frame becomes the poster; frame 1 when None.
    pub poster_frame: Option<u32>,
    /// Extra pins to point at the new version (reserved names are
    /// skipped with a warning).
    pub pins: Vec<String>,
    /// Carry forward entries of the previous version that this publish
    /// does not itself provide.
    pub merge: bool,
    /// Digest source and pool copy after each store.
    pub verify_copy: bool,
}

impl PublishRequest {
    pub fn new(source: impl Into<PathBuf>) -> PublishRequest {
        PublishRequest {
            source: source.into(),
            keyvalues: BTreeMap::new(),
            keywords: Vec::new(),
            notes: None,
            thumbnails: Vec::new(),
            poster_frame: None,
            pins: Vec::new(),
            merge: true,
            verify_copy: false,
        }
    }
}

/// Coordinator for one asset directory.
///
/// Each instance owns an in-memory size index per pool; independent
/// instances (or processes) over the same asset stay correct because
/// every on-disk mutation goes through an exclusive-create or an atomic
/// rename.
#[derive(Debug)]
pub struct Asset {
    name: String,
    asset_d: PathBuf,
    data_pool: Pool,
    thumbnail_pool: Pool,
    skip_patterns: Vec<Regex>,
    auto_pin: Option<String>,
    file_count_warning: usize,
}

impl Asset {
    /// Bind to the asset `name` under `parent_d`. The asset directory
    /// itself need not exist yet (the first publish creates it); the
    /// parent must.
    pub fn new(name: &str, parent_d: &Path, config: &Config) -> Result<Asset> {
        if name.is_empty() || !parent_d.is_dir() {
            return Err(StoreError::DestinationUnusable(parent_d.to_path_buf()));
        }
        let asset_d = parent_d.join(name);
        let data_pool = Pool::open(&asset_d.join(DATA_DIR))?;
        let thumbnail_pool = Pool::open(&asset_d.join(THUMBNAIL_DATA_DIR))?;

        let auto_pin = if config.auto_create_default_pin && !config.default_pin_name.is_empty() {
            let pin_n = config.default_pin_name.to_uppercase();
            if pin::RESERVED_PINS.contains(&pin_n.as_str()) {
                tracing::warn!("default pin name {} is reserved; ignoring", pin_n);
                None
            } else {
                Some(pin_n)
            }
        } else {
            None
        };

        Ok(Asset {
            name: name.to_string(),
            asset_d,
            data_pool,
            thumbnail_pool,
            skip_patterns: config.compiled_skip_patterns(),
            auto_pin,
            file_count_warning: config.file_count_warning,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.asset_d
    }

    /// True iff `path` is the root directory of an asset: it exists, is
    /// a directory, and carries the `.asset` marker.
    pub fn is_asset_root(path: &Path) -> bool {
        path.is_dir() && path.join(ASSET_MARKER).is_file()
    }

    /// True iff `path` or any of its ancestors is an asset root.
    pub fn is_within_asset(path: &Path) -> bool {
        path.ancestors().any(Self::is_asset_root)
    }

    /// All version directory names in the asset, ascending by number.
    pub fn versions(&self) -> Result<Vec<String>> {
        let mut found: Vec<(u32, String)> = Vec::new();
        if !self.asset_d.is_dir() {
            return Ok(Vec::new());
        }
        for entry in fs::read_dir(&self.asset_d)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(num) = version::parse_version_name(&name) {
                found.push((num, name));
            }
        }
        found.sort();
        Ok(found.into_iter().map(|(_, name)| name).collect())
    }

    /// Highest version number currently reserved; 0 when the asset is
    /// empty or does not exist yet.
    pub fn highest_version(&self) -> Result<u32> {
        let mut highest = 0;
        for name in self.versions()? {
            if let Some(num) = version::parse_version_name(&name) {
                highest = highest.max(num);
            }
        }
        if highest > MAX_VERSION {
            return Err(StoreError::VersionOverflow);
        }
        Ok(highest)
    }

    /// The on-disk directory name for a version number, if reserved.
    fn version_dir_name(&self, num: u32) -> Result<Option<String>> {
        Ok(self
            .versions()?
            .into_iter()
            .find(|name| version::parse_version_name(name) == Some(num)))
    }

    /// Create the asset directory, marker, and pools. Losing the create
    /// race to another publisher is fine; the winner lays down the
    /// marker and we only make sure the pools exist before copying.
    fn create_asset(&self) -> Result<()> {
        match fs::create_dir(&self.asset_d) {
            Ok(()) => {
                fs::File::create(self.asset_d.join(ASSET_MARKER))?;
                fs::create_dir(self.asset_d.join(DATA_DIR))?;
                fs::create_dir(self.asset_d.join(THUMBNAIL_DATA_DIR))?;
                tracing::info!("created asset {}", self.asset_d.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && self.asset_d.is_dir() => {
                fs::create_dir_all(self.asset_d.join(DATA_DIR))?;
                fs::create_dir_all(self.asset_d.join(THUMBNAIL_DATA_DIR))?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reserve the next version number, creating the asset on first use.
    ///
    /// `mkdir` is the lock: whoever creates `vNNNN` owns it. On EEXIST
    /// another publisher won that number and we recompute. That branch
    /// is expected control flow, not an error.
    pub fn reserve_version(&mut self) -> Result<Version> {
        self.create_asset()?;

        for _ in 0..RESERVE_ATTEMPTS {
            let highest = self.highest_version()?;
            if highest >= MAX_VERSION {
                return Err(StoreError::VersionOverflow);
            }
            let candidate = Version::new(&self.asset_d, highest + 1);
            match fs::create_dir(candidate.dir()) {
                Ok(()) => {
                    self.create_sidecar(&candidate)?;
                    tracing::info!("reserved {} in {}", candidate.name(), self.name);
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::ReservationExhausted {
            asset: self.name.clone(),
            attempts: RESERVE_ATTEMPTS,
        })
    }

    /// Create the `.vNNNN` sidecar (with its thumbnails dir) and swing
    /// the `.metadata` link to it.
    fn create_sidecar(&self, version: &Version) -> Result<()> {
        let sidecar = Sidecar::new(&self.asset_d, version.name());
        fs::create_dir_all(sidecar.thumbnails_dir())?;
        self.retarget_metadata_link(version.name())
    }

    /// Atomically repoint `.metadata` at the given version's sidecar.
    fn retarget_metadata_link(&self, version_n: &str) -> Result<()> {
        let link_p = self.asset_d.join(METADATA_LINK);
        if let Ok(meta) = link_p.symlink_metadata() {
            if !meta.file_type().is_symlink() {
                return Err(StoreError::PinOverwriteNonLink(METADATA_LINK.to_string()));
            }
        }
        let tmp_p = self.asset_d.join(pin::tmp_link_name("metadata"));
        symlink(Path::new(&format!("./.{}", version_n)), &tmp_p)?;
        if let Err(e) = fs::rename(&tmp_p, &link_p) {
            let _ = fs::remove_file(&tmp_p);
            return Err(e.into());
        }
        Ok(())
    }

    /// Publish a source tree as the next version of this asset.
    ///
    /// Order matters: reserve, populate, write the sidecar, THEN merge
    /// forward (so freshly published files shadow carried ones), then
    /// move the pins. A failure after reservation leaves the partial
    /// version on disk; see [`Asset::scrub`].
    pub fn publish(&mut self, request: &PublishRequest) -> Result<Version> {
        if !request.source.exists() {
            return Err(StoreError::SourceMissing(request.source.clone()));
        }

        let prev_num = self.highest_version()?;
        let version = self.reserve_version()?;

        let stored = version.populate(
            &mut self.data_pool,
            &request.source,
            &self.skip_patterns,
            request.verify_copy,
        )?;
        if self.file_count_warning > 0 && stored.len() > self.file_count_warning {
            tracing::warn!(
                "publish of {} stored {} files (warning threshold {})",
                self.name,
                stored.len(),
                self.file_count_warning
            );
        }

        let sidecar = Sidecar::new(&self.asset_d, version.name());
        if !request.keyvalues.is_empty() {
            sidecar.add_keyvalues(&request.keyvalues)?;
        }
        if !request.keywords.is_empty() {
            sidecar.add_keywords(&request.keywords)?;
        }
        if let Some(notes) = &request.notes {
            sidecar.write_notes(notes, true)?;
        }
        if !request.thumbnails.is_empty() {
            thumbnails::add_thumbnails(
                &self.name,
                &sidecar.thumbnails_dir(),
                &mut self.thumbnail_pool,
                &request.thumbnails,
                request.poster_frame,
            )?;
        }

        if request.merge && prev_num > 0 {
            if let Some(prev_n) = self.version_dir_name(prev_num)? {
                version.merge_from(&self.asset_d.join(&prev_n))?;
                if request.thumbnails.is_empty() {
                    self.merge_thumbnails(&prev_n, &sidecar)?;
                }
            }
        }

        pin::set_pin(&self.asset_d, "CURRENT", version.name())?;
        pin::set_pin(&self.asset_d, "LATEST", version.name())?;
        for pin_n in &request.pins {
            let pin_n = pin_n.to_uppercase();
            if pin::RESERVED_PINS.contains(&pin_n.as_str()) {
                tracing::warn!("skipping reserved pin name {}", pin_n);
                continue;
            }
            pin::set_pin(&self.asset_d, &pin_n, version.name())?;
        }
        if let Some(auto_pin) = &self.auto_pin {
            pin::set_pin(&self.asset_d, auto_pin, version.name())?;
        }

        tracing::info!(
            "published {} {} ({} file(s))",
            self.name,
            version.name(),
            stored.len()
        );
        Ok(version)
    }

    /// Replicate the previous sidecar's thumbnail links into the new
    /// sidecar. Links only; the thumbnail pool gains nothing.
    fn merge_thumbnails(&self, prev_version_n: &str, sidecar: &Sidecar) -> Result<()> {
        let prev_thumbs = Sidecar::new(&self.asset_d, prev_version_n).thumbnails_dir();
        if !prev_thumbs.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(&prev_thumbs)? {
            let entry = entry?;
            if !entry.file_type()?.is_symlink() {
                continue;
            }
            let dest_p = sidecar.thumbnails_dir().join(entry.file_name());
            if dest_p.symlink_metadata().is_ok() {
                continue;
            }
            let target = fs::read_link(entry.path())?;
            symlink(&target, &dest_p)?;
        }
        Ok(())
    }

    /// The pins currently pointing at `version_n`.
    pub fn version_pins(&self, version_n: &str) -> Result<Vec<String>> {
        Ok(pin::list_pins(&self.asset_d)?
            .into_iter()
            .filter(|(_, target)| target == version_n)
            .map(|(name, _)| name)
            .collect())
    }

    /// Set a pin by hand. `CURRENT` may be pointed at a non-latest
    /// version this way.
    pub fn set_pin(&self, name: &str, version_n: &str) -> Result<()> {
        let num = version::parse_version_name(version_n)
            .ok_or_else(|| StoreError::VersionMissing(version_n.to_string()))?;
        match self.version_dir_name(num)? {
            Some(actual) => pin::set_pin(&self.asset_d, &name.to_uppercase(), &actual),
            None => Err(StoreError::VersionMissing(version_n.to_string())),
        }
    }

    pub fn remove_pin(&self, name: &str) -> Result<()> {
        pin::remove_pin(&self.asset_d, name)
    }

    pub fn pins(&self) -> Result<Vec<(String, String)>> {
        pin::list_pins(&self.asset_d)
    }

    /// Delete one version and any pool data only it references.
    ///
    /// Refused while any pin targets the version. Reachability over the
    /// surviving versions (and sidecars, for the thumbnail pool) is
    /// computed before anything is unlinked.
    pub fn delete_version(&mut self, version_n: &str) -> Result<()> {
        let num = version::parse_version_name(version_n)
            .ok_or_else(|| StoreError::VersionMissing(version_n.to_string()))?;
        let actual = self
            .version_dir_name(num)?
            .ok_or_else(|| StoreError::VersionMissing(version_n.to_string()))?;

        let meta_d = self.asset_d.join(format!(".{}", actual));
        if !meta_d.is_dir() {
            return Err(StoreError::MetadataMissing(meta_d));
        }

        let pins = self.version_pins(&actual)?;
        if !pins.is_empty() {
            return Err(StoreError::PinOnVictim {
                version: actual,
                pins,
            });
        }

        self.delete_version_unchecked(&actual)
    }

    /// The GC half of delete: compute keep-sets, drop the victim's
    /// now-unreferenced pool files, remove both directories. Tolerates a
    /// missing sidecar (scrub relies on that).
    fn delete_version_unchecked(&mut self, version_n: &str) -> Result<()> {
        let ver_d = self.asset_d.join(version_n);
        let meta_d = self.asset_d.join(format!(".{}", version_n));

        // Keep-sets FIRST: everything reachable from the dirs we are not
        // deleting, resolved to canonical pool paths.
        let keep_ver_dirs: Vec<PathBuf> = self
            .versions()?
            .into_iter()
            .filter(|name| name != version_n)
            .map(|name| self.asset_d.join(name))
            .collect();
        let keep_meta_dirs: Vec<PathBuf> = self
            .sidecar_names()?
            .into_iter()
            .filter(|name| name != &format!(".{}", version_n))
            .map(|name| self.asset_d.join(name))
            .collect();
        let keep_data = resolve_link_targets(&keep_ver_dirs)?;
        let keep_thumbs = resolve_link_targets(&keep_meta_dirs)?;

        self.gc_pool_files(&[ver_d.clone()], &keep_data, DATA_DIR)?;
        if meta_d.is_dir() {
            self.gc_pool_files(&[meta_d.clone()], &keep_thumbs, THUMBNAIL_DATA_DIR)?;
        }

        fs::remove_dir_all(&ver_d)?;
        if meta_d.is_dir() {
            fs::remove_dir_all(&meta_d)?;
        }
        tracing::info!("deleted {} from {}", version_n, self.name);
        Ok(())
    }

    /// Unlink every pool file referenced from `dirs` that is inside the
    /// named pool and not in the keep-set.
    fn gc_pool_files(
        &mut self,
        dirs: &[PathBuf],
        keep: &HashSet<PathBuf>,
        pool_dir_n: &str,
    ) -> Result<()> {
        let pool_d = match fs::canonicalize(self.asset_d.join(pool_dir_n)) {
            Ok(p) => p,
            Err(_) => return Ok(()),
        };
        for target in resolve_link_targets(dirs)? {
            if target.starts_with(&pool_d) && !keep.contains(&target) {
                tracing::debug!("unlinking unreferenced pool file {}", target.display());
                fs::remove_file(&target)?;
                self.data_pool.forget(&target);
                self.thumbnail_pool.forget(&target);
            }
        }
        Ok(())
    }

    /// All `.vNNNN` sidecar directory names.
    fn sidecar_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if !self.asset_d.is_dir() {
            return Ok(names);
        }
        for entry in fs::read_dir(&self.asset_d)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name
                .strip_prefix('.')
                .and_then(version::parse_version_name)
                .is_some()
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Retain only the highest version, deleting every other one.
    ///
    /// With `cascade_pins`, `CURRENT` and `LATEST` are retargeted at the
    /// kept version and user pins on doomed versions are unlinked.
    /// Without it, any user pin on a doomed version aborts the collapse
    /// before anything is touched.
    pub fn collapse(&mut self, cascade_pins: bool) -> Result<()> {
        let keep_num = self.highest_version()?;
        if keep_num == 0 {
            return Ok(());
        }
        let keep_n = self
            .version_dir_name(keep_num)?
            .expect("highest version exists");
        let doomed: Vec<String> = self
            .versions()?
            .into_iter()
            .filter(|name| name != &keep_n)
            .collect();

        if !cascade_pins {
            for name in &doomed {
                let user_pins: Vec<String> = self
                    .version_pins(name)?
                    .into_iter()
                    .filter(|p| !pin::RESERVED_PINS.contains(&p.as_str()))
                    .collect();
                if !user_pins.is_empty() {
                    return Err(StoreError::PinOnVictim {
                        version: name.clone(),
                        pins: user_pins,
                    });
                }
            }
        }

        // The automatic pins always follow the kept version.
        pin::set_pin(&self.asset_d, "CURRENT", &keep_n)?;
        pin::set_pin(&self.asset_d, "LATEST", &keep_n)?;

        if cascade_pins {
            for name in &doomed {
                for pin_n in self.version_pins(name)? {
                    pin::remove_pin(&self.asset_d, &pin_n)?;
                }
            }
        }

        for name in &doomed {
            self.delete_version(name)?;
        }
        tracing::info!("collapsed {} to {}", self.name, keep_n);
        Ok(())
    }

    /// Remove leftovers of interrupted publishes: version directories
    /// with no sidecar and sidecars with no version directory. Pinned
    /// versions are never scrubbed. Returns what was removed.
    pub fn scrub(&mut self) -> Result<Vec<String>> {
        let mut scrubbed = Vec::new();

        for name in self.versions()? {
            let meta_d = self.asset_d.join(format!(".{}", name));
            if meta_d.is_dir() {
                continue;
            }
            if !self.version_pins(&name)?.is_empty() {
                tracing::warn!("not scrubbing {}: it is pinned", name);
                continue;
            }
            self.delete_version_unchecked(&name)?;
            scrubbed.push(name);
        }

        for meta_n in self.sidecar_names()? {
            let version_n = meta_n.trim_start_matches('.').to_string();
            if self.asset_d.join(&version_n).is_dir() {
                continue;
            }
            // orphan sidecar: GC its thumbnail links, then drop it
            let keep_meta_dirs: Vec<PathBuf> = self
                .sidecar_names()?
                .into_iter()
                .filter(|name| name != &meta_n)
                .map(|name| self.asset_d.join(name))
                .collect();
            let keep_thumbs = resolve_link_targets(&keep_meta_dirs)?;
            let meta_d = self.asset_d.join(&meta_n);
            self.gc_pool_files(&[meta_d.clone()], &keep_thumbs, THUMBNAIL_DATA_DIR)?;
            fs::remove_dir_all(&meta_d)?;
            scrubbed.push(meta_n);
        }

        if !scrubbed.is_empty() {
            tracing::info!("scrubbed {:?} from {}", scrubbed, self.name);
        }
        Ok(scrubbed)
    }
}

/// Canonical targets of every symlink under the given directories.
/// Dangling links resolve to nothing and are skipped.
fn resolve_link_targets(dirs: &[PathBuf]) -> Result<HashSet<PathBuf>> {
    let mut targets = HashSet::new();
    for dir in dirs {
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() {
                continue;
            }
            if let Ok(resolved) = fs::canonicalize(entry.path()) {
                targets.insert(resolved);
            }
        }
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn asset(tmp: &TempDir, name: &str) -> Asset {
        Asset::new(name, tmp.path(), &Config::default()).unwrap()
    }

    fn write_source(tmp: &TempDir, rel: &str, content: &[u8]) -> PathBuf {
        let p = tmp.path().join("sources").join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(&p, content).unwrap();
        p
    }

    #[test]
    fn test_new_requires_usable_parent() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let err = Asset::new("widget", &missing, &Config::default()).unwrap_err();
        assert!(matches!(err, StoreError::DestinationUnusable(_)));
        let err = Asset::new("", tmp.path(), &Config::default()).unwrap_err();
        assert!(matches!(err, StoreError::DestinationUnusable(_)));
    }

    #[test]
    fn test_highest_version_of_missing_asset_is_zero() {
        let tmp = TempDir::new().unwrap();
        let asset = asset(&tmp, "widget");
        assert_eq!(asset.highest_version().unwrap(), 0);
    }

    #[test]
    fn test_reserve_creates_asset_layout() {
        let tmp = TempDir::new().unwrap();
        let mut asset = asset(&tmp, "widget");
        let version = asset.reserve_version().unwrap();

        assert_eq!(version.name(), "v0001");
        let asset_d = tmp.path().join("widget");
        assert!(asset_d.join(".asset").is_file());
        assert!(asset_d.join(".data").is_dir());
        assert!(asset_d.join(".thumbnaildata").is_dir());
        assert!(asset_d.join("v0001").is_dir());
        assert!(asset_d.join(".v0001").join("thumbnails").is_dir());
        assert_eq!(
            fs::read_link(asset_d.join(".metadata")).unwrap(),
            PathBuf::from("./.v0001")
        );
        assert!(Asset::is_asset_root(&asset_d));
        assert!(Asset::is_within_asset(&asset_d.join("v0001")));
        assert!(!Asset::is_within_asset(tmp.path()));
    }

    #[test]
    fn test_sequential_reservation() {
        let tmp = TempDir::new().unwrap();
        let mut asset = asset(&tmp, "widget");
        assert_eq!(asset.reserve_version().unwrap().name(), "v0001");
        assert_eq!(asset.reserve_version().unwrap().name(), "v0002");
        assert_eq!(asset.reserve_version().unwrap().name(), "v0003");
        assert_eq!(asset.highest_version().unwrap(), 3);
    }

    #[test]
    fn test_metadata_link_follows_latest_reservation() {
        let tmp = TempDir::new().unwrap();
        let mut asset = asset(&tmp, "widget");
        asset.reserve_version().unwrap();
        asset.reserve_version().unwrap();
        assert_eq!(
            fs::read_link(tmp.path().join("widget/.metadata")).unwrap(),
            PathBuf::from("./.v0002")
        );
    }

    #[test]
    fn test_publish_single_file() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(&tmp, "foo.txt", b"hello");
        let mut asset = asset(&tmp, "widget");

        let version = asset.publish(&PublishRequest::new(&source)).unwrap();
        assert_eq!(version.name(), "v0001");

        let asset_d = tmp.path().join("widget");
        let link = asset_d.join("v0001/foo.txt");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        let target = fs::canonicalize(&link).unwrap();
        assert_eq!(
            target,
            fs::canonicalize(asset_d.join(".data/foo_sqv0001.txt")).unwrap()
        );
        assert_eq!(fs::read(&link).unwrap(), b"hello");
        assert_eq!(pin::resolve_pin(&asset_d, "CURRENT").unwrap(), "v0001");
        assert_eq!(pin::resolve_pin(&asset_d, "LATEST").unwrap(), "v0001");
    }

    #[test]
    fn test_publish_missing_source() {
        let tmp = TempDir::new().unwrap();
        let mut asset = asset(&tmp, "widget");
        let err = asset
            .publish(&PublishRequest::new(tmp.path().join("nope")))
            .unwrap_err();
        assert!(matches!(err, StoreError::SourceMissing(_)));
        // nothing was created
        assert!(!tmp.path().join("widget").exists());
    }

    #[test]
    fn test_publish_skips_configured_patterns() {
        let tmp = TempDir::new().unwrap();
        write_source(&tmp, "tree/scene.ma", b"scene");
        write_source(&tmp, "tree/scene.swp", b"junk");
        let config = Config {
            skip_patterns: vec![r"\.swp$".to_string()],
            ..Config::default()
        };
        let mut asset = Asset::new("widget", tmp.path(), &config).unwrap();
        asset
            .publish(&PublishRequest::new(tmp.path().join("sources/tree")))
            .unwrap();
        let v1 = tmp.path().join("widget/v0001");
        assert!(v1.join("scene.ma").symlink_metadata().is_ok());
        assert!(v1.join("scene.swp").symlink_metadata().is_err());
    }

    #[test]
    fn test_publish_writes_sidecar() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(&tmp, "foo.txt", b"hello");
        let mut asset = asset(&tmp, "widget");

        let mut request = PublishRequest::new(&source);
        request.keywords = vec!["model".to_string()];
        request
            .keyvalues
            .insert("artist".to_string(), "ada".to_string());
        request.notes = Some("first publish".to_string());
        asset.publish(&request).unwrap();

        let sidecar = Sidecar::new(&tmp.path().join("widget"), "v0001");
        assert_eq!(sidecar.list_keywords().unwrap(), vec!["MODEL"]);
        assert_eq!(
            sidecar.keyvalues().unwrap().get("ARTIST").map(String::as_str),
            Some("ada")
        );
        assert_eq!(sidecar.notes().unwrap(), "first publish");
    }

    #[test]
    fn test_publish_extra_pins_skip_reserved() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(&tmp, "foo.txt", b"hello");
        let mut asset = asset(&tmp, "widget");
        let mut request = PublishRequest::new(&source);
        request.pins = vec!["release".to_string(), "latest".to_string()];
        asset.publish(&request).unwrap();

        let asset_d = tmp.path().join("widget");
        assert_eq!(pin::resolve_pin(&asset_d, "RELEASE").unwrap(), "v0001");
        // LATEST was set once by the publish itself, not twice
        assert_eq!(pin::resolve_pin(&asset_d, "LATEST").unwrap(), "v0001");
    }

    #[test]
    fn test_auto_default_pin() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(&tmp, "foo.txt", b"hello");
        let config = Config {
            auto_create_default_pin: true,
            default_pin_name: "work".to_string(),
            ..Config::default()
        };
        let mut asset = Asset::new("widget", tmp.path(), &config).unwrap();
        asset.publish(&PublishRequest::new(&source)).unwrap();
        assert_eq!(
            pin::resolve_pin(&tmp.path().join("widget"), "WORK").unwrap(),
            "v0001"
        );
    }

    #[test]
    fn test_delete_version_keeps_shared_pool_data() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(&tmp, "foo.txt", b"shared");
        let mut asset = asset(&tmp, "widget");
        asset.publish(&PublishRequest::new(&source)).unwrap();
        asset.publish(&PublishRequest::new(&source)).unwrap();

        // v0002 references the same pool file; deleting v0001 must not GC it
        asset.set_pin("CURRENT", "v0002").unwrap();
        asset.set_pin("LATEST", "v0002").unwrap();
        asset.delete_version("v0001").unwrap();

        let asset_d = tmp.path().join("widget");
        assert!(!asset_d.join("v0001").exists());
        assert!(!asset_d.join(".v0001").exists());
        assert_eq!(fs::read(asset_d.join("v0002/foo.txt")).unwrap(), b"shared");
        assert_eq!(fs::read_dir(asset_d.join(".data")).unwrap().count(), 1);
    }

    #[test]
    fn test_delete_version_drops_exclusive_pool_data() {
        let tmp = TempDir::new().unwrap();
        let a = write_source(&tmp, "a/foo.txt", b"first");
        let b = write_source(&tmp, "b/foo.txt", b"second");
        let mut asset = asset(&tmp, "widget");
        let mut first = PublishRequest::new(&a);
        first.merge = false;
        asset.publish(&first).unwrap();
        let mut second = PublishRequest::new(&b);
        second.merge = false;
        asset.publish(&second).unwrap();

        asset.delete_version("v0001").unwrap();
        let data_d = tmp.path().join("widget/.data");
        let remaining: Vec<String> = fs::read_dir(&data_d)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(
            fs::read(tmp.path().join("widget/v0002/foo.txt")).unwrap(),
            b"second"
        );
    }

    #[test]
    fn test_delete_missing_version() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(&tmp, "foo.txt", b"x");
        let mut asset = asset(&tmp, "widget");
        asset.publish(&PublishRequest::new(&source)).unwrap();
        let err = asset.delete_version("v0005").unwrap_err();
        assert!(matches!(err, StoreError::VersionMissing(_)));
    }

    #[test]
    fn test_collapse_without_cascade_fails_on_user_pin() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(&tmp, "foo.txt", b"x");
        let mut asset = asset(&tmp, "widget");
        asset.publish(&PublishRequest::new(&source)).unwrap();
        asset.publish(&PublishRequest::new(&source)).unwrap();
        asset.set_pin("KEEPER", "v0001").unwrap();

        let err = asset.collapse(false).unwrap_err();
        assert!(matches!(err, StoreError::PinOnVictim { .. }));
        // nothing was deleted
        assert_eq!(asset.versions().unwrap(), vec!["v0001", "v0002"]);
    }

    #[test]
    fn test_scrub_removes_half_published_version() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(&tmp, "foo.txt", b"x");
        let mut asset = asset(&tmp, "widget");
        asset.publish(&PublishRequest::new(&source)).unwrap();

        // simulate a publisher that died right after mkdir
        fs::create_dir(tmp.path().join("widget/v0002")).unwrap();
        let scrubbed = asset.scrub().unwrap();
        assert_eq!(scrubbed, vec!["v0002"]);
        assert!(!tmp.path().join("widget/v0002").exists());
        assert!(tmp.path().join("widget/v0001").is_dir());
    }

    #[test]
    fn test_scrub_removes_orphan_sidecar() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(&tmp, "foo.txt", b"x");
        let mut asset = asset(&tmp, "widget");
        asset.publish(&PublishRequest::new(&source)).unwrap();

        fs::create_dir_all(tmp.path().join("widget/.v0009/thumbnails")).unwrap();
        let scrubbed = asset.scrub().unwrap();
        assert_eq!(scrubbed, vec![".v0009"]);
        assert!(!tmp.path().join("widget/.v0009").exists());
    }

    #[test]
    fn test_scrub_spares_pinned_versions() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(&tmp, "foo.txt", b"x");
        let mut asset = asset(&tmp, "widget");
        asset.publish(&PublishRequest::new(&source)).unwrap();

        // break the sidecar but pin the version
        fs::remove_dir_all(tmp.path().join("widget/.v0001")).unwrap();
        let scrubbed = asset.scrub().unwrap();
        assert!(scrubbed.is_empty());
        assert!(tmp.path().join("widget/v0001").is_dir());
    }
}
