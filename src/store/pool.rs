//! Content-deduplicating copy engine.
//!
//! Every version directory file is a symlink into the asset's pool; the
//! pool holds one file per unique content blob. Lookups are size-first,
//! then a byte-for-byte comparison against the candidates of that size,
//! so two pool files never share content.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read};
use std::os::unix::fs::symlink;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

/// Prefix of the collision suffix inserted into pool file names.
pub const VER_PREFIX: &str = "sqv";
/// Zero-padding width of the collision suffix.
pub const NUM_DIGITS: usize = 4;

const COMPARE_BUF_SIZE: usize = 64 * 1024;

/// A pool directory plus its in-memory size index (file size -> pool
/// files of that size). The index is built when the pool is opened and
/// updated on every insertion; it is never persisted.
#[derive(Debug)]
pub struct Pool {
    dir: PathBuf,
    by_size: HashMap<u64, Vec<PathBuf>>,
}

impl Pool {
    /// Open a pool directory, indexing any existing entries by size. A
    /// pool directory that does not exist yet yields an empty index (the
    /// directory itself is created when the asset is).
    pub fn open(dir: &Path) -> Result<Pool> {
        let mut by_size: HashMap<u64, Vec<PathBuf>> = HashMap::new();
        if dir.is_dir() {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let meta = entry.metadata()?;
                if meta.is_file() {
                    by_size.entry(meta.len()).or_default().push(entry.path());
                }
            }
        }
        Ok(Pool {
            dir: dir.to_path_buf(),
            by_size,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` into the pool unless identical content is already
    /// stored, then leave a relative symlink at `dest_link` pointing at
    /// the pool file. Returns the pool path backing the link.
    pub fn store(&mut self, source: &Path, dest_link: &Path, verify: bool) -> Result<PathBuf> {
        if !source.is_file() {
            return Err(StoreError::SourceMissing(source.to_path_buf()));
        }
        let size = fs::metadata(source)?.len();

        let mut pool_p: Option<PathBuf> = None;
        if let Some(candidates) = self.by_size.get(&size) {
            for candidate in candidates {
                if files_identical(source, candidate)? {
                    tracing::debug!(
                        "dedup hit: {} already stored as {}",
                        source.display(),
                        candidate.display()
                    );
                    pool_p = Some(candidate.clone());
                    break;
                }
            }
        }
        let pool_p = match pool_p {
            Some(existing) => existing,
            None => self.copy_into_pool(source, size)?,
        };

        if verify {
            let source_digest = sha256_file(source)?;
            let pool_digest = sha256_file(&pool_p)?;
            if source_digest != pool_digest {
                return Err(StoreError::PoolCorruption {
                    source_file: source.to_path_buf(),
                    source_digest: hex::encode(source_digest),
                    pool_file: pool_p.clone(),
                    pool_digest: hex::encode(pool_digest),
                });
            }
        }

        if let Some(parent) = dest_link.parent() {
            fs::create_dir_all(parent)?;
        }
        let link_dir = dest_link.parent().unwrap_or_else(|| Path::new(""));
        symlink(relative_to(link_dir, &pool_p), dest_link)?;
        Ok(pool_p)
    }

    /// Claim a free `<base>_sqvNNNN<ext>` name and copy the source bytes
    /// into it. Exclusive create arbitrates the suffix between
    /// concurrent publishers.
    fn copy_into_pool(&mut self, source: &Path, size: u64) -> Result<PathBuf> {
        let file_n = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::SourceMissing(source.to_path_buf()))?;
        let (stem, ext) = split_name(file_n);

        for suffix in 1..=9999u32 {
            let pool_n = format!(
                "{}_{}{:0width$}{}",
                stem,
                VER_PREFIX,
                suffix,
                ext,
                width = NUM_DIGITS
            );
            let pool_p = self.dir.join(&pool_n);
            match OpenOptions::new().write(true).create_new(true).open(&pool_p) {
                Ok(mut out) => {
                    let mut reader = File::open(source)?;
                    io::copy(&mut reader, &mut out)?;
                    self.by_size.entry(size).or_default().push(pool_p.clone());
                    tracing::debug!("stored {} as {}", source.display(), pool_p.display());
                    return Ok(pool_p);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("pool collision suffixes exhausted for {}", file_n),
        )))
    }

    /// Drop a pool file from the size index after it has been unlinked by
    /// garbage collection.
    pub fn forget(&mut self, pool_p: &Path) {
        for paths in self.by_size.values_mut() {
            paths.retain(|p| p != pool_p);
        }
    }
}

/// Split `name.tar.gz` into `("name.tar", ".gz")`; a name with no
/// extension yields an empty extension part.
fn split_name(file_n: &str) -> (&str, String) {
    match Path::new(file_n).extension().and_then(|e| e.to_str()) {
        Some(ext) => (&file_n[..file_n.len() - ext.len() - 1], format!(".{}", ext)),
        None => (file_n, String::new()),
    }
}

/// Byte-for-byte comparison. The sizes are already known equal; a
/// candidate that vanished underneath us simply does not match.
fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    let file_b = match File::open(b) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let mut reader_a = BufReader::new(File::open(a)?);
    let mut reader_b = BufReader::new(file_b);
    let mut buf_a = vec![0u8; COMPARE_BUF_SIZE];
    let mut buf_b = vec![0u8; COMPARE_BUF_SIZE];
    loop {
        let n_a = read_full(&mut reader_a, &mut buf_a)?;
        let n_b = read_full(&mut reader_b, &mut buf_b)?;
        if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
    }
}

/// Read until the buffer is full or EOF; returns the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> io::Result<[u8; 32]> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COMPARE_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// Relative path from the directory `from` to `target`, so version
/// symlinks survive relocating the whole asset.
pub(crate) fn relative_to(from: &Path, target: &Path) -> PathBuf {
    let from_parts: Vec<Component> = from.components().collect();
    let target_parts: Vec<Component> = target.components().collect();
    let mut common = 0;
    while common < from_parts.len()
        && common < target_parts.len()
        && from_parts[common] == target_parts[common]
    {
        common += 1;
    }
    let mut rel = PathBuf::new();
    for _ in common..from_parts.len() {
        rel.push("..");
    }
    for part in &target_parts[common..] {
        rel.push(part);
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    rel
}
