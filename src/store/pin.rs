//! Pins: named symlinks at the asset root aliasing one version.
//!
//! `CURRENT` and `LATEST` are managed by the asset during publish and
//! collapse; callers are free to create any other uppercase pin.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, StoreError};

/// Pin names the store manages itself.
pub const RESERVED_PINS: &[&str] = &["CURRENT", "LATEST"];

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// A dot-prefixed temp name unique across processes and threads, for
/// the build-then-rename idiom.
pub(crate) fn tmp_link_name(base: &str) -> String {
    format!(
        ".{}.tmp-{}-{}",
        base,
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Atomically point the pin `name` at the version directory `version_n`.
/// An existing pin of that name is replaced; anything else of that name
/// is refused.
pub fn set_pin(asset_d: &Path, name: &str, version_n: &str) -> Result<()> {
    let pin_p = asset_d.join(name);
    if let Ok(meta) = pin_p.symlink_metadata() {
        if !meta.file_type().is_symlink() {
            return Err(StoreError::PinOverwriteNonLink(name.to_string()));
        }
    }
    // Build the new link under a temp name, then rename over the pin so
    // readers never observe a missing pin.
    let tmp_p = asset_d.join(tmp_link_name(name));
    symlink(Path::new(version_n), &tmp_p)?;
    if let Err(e) = fs::rename(&tmp_p, &pin_p) {
        let _ = fs::remove_file(&tmp_p);
        return Err(e.into());
    }
    tracing::debug!("pin {} -> {}", name, version_n);
    Ok(())
}

/// Remove the pin `name`. Refuses to unlink anything that is not a
/// symlink.
pub fn remove_pin(asset_d: &Path, name: &str) -> Result<()> {
    let pin_p = asset_d.join(name);
    let meta = pin_p.symlink_metadata()?;
    if !meta.file_type().is_symlink() {
        return Err(StoreError::PinOverwriteNonLink(name.to_string()));
    }
    fs::remove_file(&pin_p)?;
    Ok(())
}

/// The version name the pin points at (the trailing path component of
/// its target).
pub fn resolve_pin(asset_d: &Path, name: &str) -> Result<String> {
    let target = fs::read_link(asset_d.join(name))?;
    Ok(target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default())
}

/// All pins at the asset root, each with the version it points at,
/// sorted by name. Dot-prefixed links (`.metadata`, temp links) are
/// bookkeeping, not pins.
pub fn list_pins(asset_d: &Path) -> Result<Vec<(String, String)>> {
    let mut pins = Vec::new();
    for entry in fs::read_dir(asset_d)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type()?.is_symlink() {
            if let Ok(version_n) = resolve_pin(asset_d, &name) {
                pins.push((name, version_n));
            }
        }
    }
    pins.sort();
    Ok(pins)
}
