use crate::error::{TrainingError, TrainingResult};
use crate::job::TrainingJobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    CheckpointArchive,
    Sample,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingManifest {
    pub job_id: TrainingJobId,
    pub created_at: DateTime<Utc>,
    pub base_model: String,
    pub artifacts: Vec<TrainingArtifact>,
}

impl TrainingManifest {
    pub fn write(&self, path: &Path) -> TrainingResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(kind: ArtifactKind, path: PathBuf) -> TrainingResult<TrainingArtifact> {
    if !path.exists() {
        return Err(TrainingError::Artifact(format!(
            "artifact path does not exist: {}",
            path.display()
        )));
    }

    let hash = sha256_file(&path)?;
    Ok(TrainingArtifact { kind, path, sha256: hash })
}

/// Archive-relative name for `path` below `root`, using `/` separators.
fn archive_name(root: &Path, path: &Path) -> TrainingResult<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        TrainingError::Artifact(format!("{} is outside {}", path.display(), root.display()))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Zip every file below `dir` into `out`, with entry names relative to `dir`.
pub fn package_directory(dir: &Path, out: &Path) -> TrainingResult<TrainingArtifact> {
    if !dir.is_dir() {
        return Err(TrainingError::Artifact(format!("not a directory: {}", dir.display())));
    }
    if out.starts_with(dir) {
        return Err(TrainingError::Artifact(format!(
            "archive {} must not be written inside {}",
            out.display(),
            dir.display()
        )));
    }

    let mut zip = ZipWriter::new(File::create(out)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| TrainingError::Artifact(format!("failed to walk {}: {e}", dir.display())))?;
        let name = archive_name(dir, entry.path())?;

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else if entry.file_type().is_file() {
            tracing::debug!(entry = %name, "adding file to archive");
            zip.start_file(name, options)?;
            let mut file = File::open(entry.path())?;
            std::io::copy(&mut file, &mut zip)?;
        }
    }
    zip.finish()?;

    make_artifact(ArtifactKind::CheckpointArchive, out.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_make_artifact_requires_existing_path() {
        let temp = TempDir::new().unwrap();
        assert!(make_artifact(ArtifactKind::Sample, temp.path().join("missing.png")).is_err());
    }

    #[test]
    fn test_sha256_file_known_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_package_rejects_archive_inside_source() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out.zip");
        assert!(package_directory(temp.path(), &out).is_err());
    }
}
