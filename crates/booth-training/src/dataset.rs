//! Dataset preparation from zip archives.
//!
//! Instance and class archives are flattened into a single directory of
//! images. Anything that is not an image (by guessed MIME type), directory
//! entries, and macOS resource-fork folders are dropped.

use crate::error::{TrainingError, TrainingResult};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

const MACOS_METADATA_PREFIX: &str = "__MACOSX";

/// Whether an archive entry name belongs in a training dataset.
#[must_use]
pub fn is_image_entry(name: &str) -> bool {
    if name.is_empty() || name.ends_with('/') || name.starts_with(MACOS_METADATA_PREFIX) {
        return false;
    }
    mime_guess::from_path(name)
        .first_raw()
        .is_some_and(|mime| mime.starts_with("image/"))
}

fn base_name(name: &str) -> Option<&str> {
    name.rsplit('/').next().filter(|n| !n.is_empty() && *n != "." && *n != "..")
}

fn open_archive(archive: &Path) -> TrainingResult<ZipArchive<File>> {
    let file = File::open(archive).map_err(|e| {
        TrainingError::Dataset(format!("failed to open archive {}: {e}", archive.display()))
    })?;
    Ok(ZipArchive::new(file)?)
}

/// Extract the image entries of `archive` into `dest`, discarding directory structure.
///
/// Entries that share a base name overwrite each other in archive order.
/// Returns the written paths, without duplicates.
pub fn extract_images(archive: &Path, dest: &Path) -> TrainingResult<Vec<PathBuf>> {
    let mut zip = open_archive(archive)?;
    std::fs::create_dir_all(dest)?;

    let mut written: Vec<PathBuf> = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let name = entry.name().to_string();
        if entry.is_dir() || !is_image_entry(&name) {
            debug!(entry = %name, "skipping archive entry");
            continue;
        }
        let Some(file_name) = base_name(&name) else {
            continue;
        };

        let target = dest.join(file_name);
        let mut out = File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;

        if !written.contains(&target) {
            written.push(target);
        }
    }

    debug!(archive = %archive.display(), images = written.len(), "extracted dataset archive");
    Ok(written)
}

/// Extract every entry of `archive` into `dest`, keeping its structure.
///
/// Entries whose names would escape `dest` are skipped.
pub fn extract_all(archive: &Path, dest: &Path) -> TrainingResult<Vec<PathBuf>> {
    let mut zip = open_archive(archive)?;
    std::fs::create_dir_all(dest)?;

    let mut written = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            debug!(entry = %entry.name(), "skipping unsafe archive entry");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
        written.push(target);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_entry() {
        assert!(is_image_entry("dog.png"));
        assert!(is_image_entry("photos/dog.JPG"));
        assert!(is_image_entry("a/b/c.webp"));
        assert!(!is_image_entry("notes.txt"));
        assert!(!is_image_entry("photos/"));
        assert!(!is_image_entry("__MACOSX/photos/._dog.png"));
        assert!(!is_image_entry("no_extension"));
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("a/b/c.png"), Some("c.png"));
        assert_eq!(base_name("c.png"), Some("c.png"));
        assert_eq!(base_name("a/"), None);
    }
}
