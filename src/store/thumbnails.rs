//! Thumbnail ingestion for a version sidecar.
//!
//! Thumbnails are named `<asset_name>.<frame>.<ext>` with frame numbers
//! running 1..=N, are deduplicated through the asset's thumbnail pool,
//! and one of them is promoted to `poster.<ext>`.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{Result, StoreError};
use crate::store::pool::Pool;

/// Validate thumbnail names and frame numbering; returns (frame, path)
/// pairs sorted by frame.
fn validate_thumbnails(asset_n: &str, paths: &[PathBuf]) -> Result<Vec<(u32, PathBuf)>> {
    let pattern = Regex::new(r"^(.+)\.([0-9]+)\.(.+)$").expect("static pattern");
    let mut frames = Vec::with_capacity(paths.len());

    for path in paths {
        let file_n = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::SourceMissing(path.clone()))?;
        let caps = pattern
            .captures(file_n)
            .ok_or_else(|| StoreError::ThumbnailNameInvalid {
                file: file_n.to_string(),
                asset: asset_n.to_string(),
            })?;
        if &caps[1] != asset_n {
            return Err(StoreError::ThumbnailNameInvalid {
                file: file_n.to_string(),
                asset: asset_n.to_string(),
            });
        }
        let frame: u32 = caps[2]
            .parse()
            .map_err(|_| StoreError::ThumbnailNameInvalid {
                file: file_n.to_string(),
                asset: asset_n.to_string(),
            })?;
        frames.push((frame, path.clone()));
    }

    frames.sort_by_key(|(frame, _)| *frame);
    for (i, (frame, _)) in frames.iter().enumerate() {
        if *frame != i as u32 + 1 {
            return Err(StoreError::ThumbnailRangeNonContiguous);
        }
    }
    Ok(frames)
}

/// Ingest thumbnails into `thumb_d` (a sidecar's `thumbnails/`
/// directory) through the thumbnail pool. `poster_frame` selects which
/// frame becomes `poster.<ext>`; frame 1 when unspecified.
pub fn add_thumbnails(
    asset_n: &str,
    thumb_d: &Path,
    pool: &mut Pool,
    paths: &[PathBuf],
    poster_frame: Option<u32>,
) -> Result<()> {
    if !thumb_d.is_dir() {
        return Err(StoreError::MetadataMissing(thumb_d.to_path_buf()));
    }
    for path in paths {
        if !path.is_file() {
            return Err(StoreError::SourceMissing(path.clone()));
        }
    }
    let frames = validate_thumbnails(asset_n, paths)?;
    if frames.is_empty() {
        return Ok(());
    }

    for (_, path) in &frames {
        let file_n = path.file_name().expect("validated above");
        pool.store(path, &thumb_d.join(file_n), false)?;
    }

    let poster_n = poster_frame.unwrap_or(1);
    let poster_p = frames
        .iter()
        .find(|(frame, _)| *frame == poster_n)
        .map(|(_, path)| path)
        .ok_or(StoreError::ThumbnailRangeNonContiguous)?;
    let ext = poster_p
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    pool.store(poster_p, &thumb_d.join(format!("poster.{}", ext)), false)?;

    tracing::debug!("stored {} thumbnail(s) for {}", frames.len(), asset_n);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup(tmp: &TempDir) -> (PathBuf, Pool) {
        let asset_d = tmp.path().join("widget");
        let thumb_d = asset_d.join(".v0001").join("thumbnails");
        fs::create_dir_all(&thumb_d).unwrap();
        fs::create_dir_all(asset_d.join(".thumbnaildata")).unwrap();
        let pool = Pool::open(&asset_d.join(".thumbnaildata")).unwrap();
        (thumb_d, pool)
    }

    fn write_thumbs(tmp: &TempDir, names: &[&str]) -> Vec<PathBuf> {
        let src = tmp.path().join("thumbs");
        fs::create_dir_all(&src).unwrap();
        names
            .iter()
            .map(|name| {
                let p = src.join(name);
                fs::write(&p, name.as_bytes()).unwrap();
                p
            })
            .collect()
    }

    #[test]
    fn test_add_thumbnails_links_and_poster() {
        let tmp = TempDir::new().unwrap();
        let (thumb_d, mut pool) = setup(&tmp);
        let paths = write_thumbs(&tmp, &["widget.1.jpg", "widget.2.jpg"]);

        add_thumbnails("widget", &thumb_d, &mut pool, &paths, None).unwrap();

        assert!(thumb_d
            .join("widget.1.jpg")
            .symlink_metadata()
            .unwrap()
            .file_type()
            .is_symlink());
        assert!(thumb_d.join("widget.2.jpg").symlink_metadata().is_ok());
        // poster defaults to frame 1
        assert_eq!(
            fs::read(thumb_d.join("poster.jpg")).unwrap(),
            b"widget.1.jpg"
        );
    }

    #[test]
    fn test_explicit_poster_frame() {
        let tmp = TempDir::new().unwrap();
        let (thumb_d, mut pool) = setup(&tmp);
        let paths = write_thumbs(&tmp, &["widget.1.jpg", "widget.2.jpg"]);

        add_thumbnails("widget", &thumb_d, &mut pool, &paths, Some(2)).unwrap();
        assert_eq!(
            fs::read(thumb_d.join("poster.jpg")).unwrap(),
            b"widget.2.jpg"
        );
    }

    #[test]
    fn test_poster_shares_pool_entry_with_its_frame() {
        let tmp = TempDir::new().unwrap();
        let (thumb_d, mut pool) = setup(&tmp);
        let paths = write_thumbs(&tmp, &["widget.1.jpg"]);

        add_thumbnails("widget", &thumb_d, &mut pool, &paths, None).unwrap();
        let frame_target = fs::canonicalize(thumb_d.join("widget.1.jpg")).unwrap();
        let poster_target = fs::canonicalize(thumb_d.join("poster.jpg")).unwrap();
        assert_eq!(frame_target, poster_target);
        assert_eq!(fs::read_dir(pool.dir()).unwrap().count(), 1);
    }

    #[test]
    fn test_wrong_asset_name_rejected() {
        let tmp = TempDir::new().unwrap();
        let (thumb_d, mut pool) = setup(&tmp);
        let paths = write_thumbs(&tmp, &["gadget.1.jpg"]);
        let err = add_thumbnails("widget", &thumb_d, &mut pool, &paths, None).unwrap_err();
        assert!(matches!(err, StoreError::ThumbnailNameInvalid { .. }));
    }

    #[test]
    fn test_unnumbered_name_rejected() {
        let tmp = TempDir::new().unwrap();
        let (thumb_d, mut pool) = setup(&tmp);
        let paths = write_thumbs(&tmp, &["widget.jpg"]);
        let err = add_thumbnails("widget", &thumb_d, &mut pool, &paths, None).unwrap_err();
        assert!(matches!(err, StoreError::ThumbnailNameInvalid { .. }));
    }

    #[test]
    fn test_non_contiguous_frames_rejected() {
        let tmp = TempDir::new().unwrap();
        let (thumb_d, mut pool) = setup(&tmp);
        let paths = write_thumbs(&tmp, &["widget.1.jpg", "widget.3.jpg"]);
        let err = add_thumbnails("widget", &thumb_d, &mut pool, &paths, None).unwrap_err();
        assert!(matches!(err, StoreError::ThumbnailRangeNonContiguous));
    }

    #[test]
    fn test_frames_must_start_at_one() {
        let tmp = TempDir::new().unwrap();
        let (thumb_d, mut pool) = setup(&tmp);
        let paths = write_thumbs(&tmp, &["widget.2.jpg", "widget.3.jpg"]);
        let err = add_thumbnails("widget", &thumb_d, &mut pool, &paths, None).unwrap_err();
        assert!(matches!(err, StoreError::ThumbnailRangeNonContiguous));
    }

    #[test]
    fn test_poster_frame_outside_range_rejected() {
        let tmp = TempDir::new().unwrap();
        let (thumb_d, mut pool) = setup(&tmp);
        let paths = write_thumbs(&tmp, &["widget.1.jpg"]);
        let err = add_thumbnails("widget", &thumb_d, &mut pool, &paths, Some(5)).unwrap_err();
        assert!(matches!(err, StoreError::ThumbnailRangeNonContiguous));
    }

    #[test]
    fn test_missing_sidecar_dir_fails_fast() {
        let tmp = TempDir::new().unwrap();
        let mut pool = Pool::open(&tmp.path().join(".thumbnaildata")).unwrap();
        let paths = write_thumbs(&tmp, &["widget.1.jpg"]);
        let err = add_thumbnails(
            "widget",
            &tmp.path().join("widget/.v0001/thumbnails"),
            &mut pool,
            &paths,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::MetadataMissing(_)));
    }
}
