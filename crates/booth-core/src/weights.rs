//! Weight acquisition from a URL or an S3-compatible bucket.

use crate::config::StorageConfig;
use crate::error::FetchError;
use crate::fetch::{file_extension, scratch_file_name, HttpFetcher};
use crate::storage::{BucketProvider, S3Config, S3Settings};
use booth_training::{extract_all, JobLayout};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// The `weights` block of an inference job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightsSource {
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default, rename = "s3Config")]
    pub s3_config: Option<S3Config>,
}

/// Where a job's weights live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightReference {
    Url(String),
    S3(S3Config),
}

impl WeightsSource {
    /// `download_url` takes precedence over `s3Config`.
    pub fn reference(&self) -> Option<WeightReference> {
        if let Some(url) = self.download_url.as_ref().filter(|u| !u.trim().is_empty()) {
            return Some(WeightReference::Url(url.clone()));
        }
        self.s3_config.clone().map(WeightReference::S3)
    }
}

/// Fetches weights into a job's scratch directory.
pub struct WeightFetcher<'a> {
    pub http: &'a HttpFetcher,
    pub buckets: &'a dyn BucketProvider,
    pub storage: &'a StorageConfig,
}

impl WeightFetcher<'_> {
    /// Download the weights and unpack them when they are a zip archive.
    ///
    /// Returns the absolute weights directory for zip archives, `None` otherwise.
    pub async fn acquire(&self, reference: &WeightReference, layout: &JobLayout) -> Result<Option<PathBuf>, FetchError> {
        let downloaded = match reference {
            WeightReference::Url(url) => self.http.download(url, &layout.temp_dir()).await?,
            WeightReference::S3(config) => self.download_from_bucket(config, layout).await?,
        };

        let extension = file_extension(&downloaded.to_string_lossy());
        if extension != "zip" {
            warn!(
                path = %downloaded.display(),
                "weights are not a zip archive; nothing to unpack"
            );
            return Ok(None);
        }

        let weights_dir = layout.weights_dir();
        let files = extract_all(&downloaded, &weights_dir)?;
        info!(dir = %weights_dir.display(), files = files.len(), "unpacked weights");
        Ok(Some(std::fs::canonicalize(&weights_dir)?))
    }

    async fn download_from_bucket(&self, config: &S3Config, layout: &JobLayout) -> Result<PathBuf, FetchError> {
        let key = config
            .file_name
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| FetchError::InvalidReference("s3Config.fileName is required for weights".to_string()))?;
        let settings = S3Settings::resolve(config, self.storage)?;
        info!(bucket = %settings.bucket, file = %key, "fetching weights from bucket");

        let bucket = self.buckets.open(&settings)?;
        let dest = layout.temp_dir().join(scratch_file_name(&file_extension(key)));
        bucket.download(key, &dest).await?;
        Ok(dest)
    }
}
