//! Delivering generated images: inline as data URIs, or uploaded to a bucket.

use crate::error::FetchError;
use crate::fetch::file_extension;
use crate::storage::ObjectBucket;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use booth_training::TrainingJobId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One generated image in a job response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// `data:<mime>;base64,...` or the URL of the uploaded object.
    pub image: String,
}

/// Encode a file as a `data:` URI.
pub fn inline_image(path: &Path) -> Result<String, FetchError> {
    let bytes = std::fs::read(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Ok(format!("data:{};base64,{}", mime.essence_str(), STANDARD.encode(bytes)))
}

pub fn inline_images(paths: &[PathBuf]) -> Result<Vec<ImageEntry>, FetchError> {
    paths
        .iter()
        .map(|p| inline_image(p).map(|image| ImageEntry { image }))
        .collect()
}

/// Object key for the `index`-th image of a job.
#[must_use]
pub fn image_key(job_id: &TrainingJobId, index: usize, path: &Path) -> String {
    let extension = file_extension(&path.to_string_lossy());
    if extension.is_empty() {
        format!("{job_id}/{index}")
    } else {
        format!("{job_id}/{index}.{extension}")
    }
}

/// Upload images in order; entry `i` refers to `paths[i]`.
pub async fn upload_images(
    bucket: &ObjectBucket,
    job_id: &TrainingJobId,
    paths: &[PathBuf],
) -> Result<Vec<ImageEntry>, FetchError> {
    let mut entries = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        let image = bucket.upload_file(&image_key(job_id, index, path), path).await?;
        entries.push(ImageEntry { image });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_inline_image_data_uri() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("0.png");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(inline_image(&path).unwrap(), "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_image_key() {
        let job = TrainingJobId("job-7".to_string());
        assert_eq!(image_key(&job, 2, Path::new("/tmp/out/sample.jpg")), "job-7/2.jpg");
        assert_eq!(image_key(&job, 0, Path::new("/tmp/out/raw")), "job-7/0");
    }

    #[tokio::test]
    async fn test_upload_images_one_entry_per_image_in_order() {
        let temp = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..3)
            .map(|i| {
                let p = temp.path().join(format!("out-{i}.png"));
                std::fs::write(&p, format!("image {i}")).unwrap();
                p
            })
            .collect();

        let bucket = ObjectBucket::new(Arc::new(InMemory::new()), "https://cdn.example.com/out");
        let entries = upload_images(&bucket, &TrainingJobId("job".to_string()), &paths).await.unwrap();

        let urls: Vec<&str> = entries.iter().map(|e| e.image.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example.com/out/job/0.png",
                "https://cdn.example.com/out/job/1.png",
                "https://cdn.example.com/out/job/2.png",
            ]
        );
    }
}
