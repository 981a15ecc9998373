//! S3-compatible object storage.
//!
//! Jobs describe buckets with an `s3Config` object. Fields the job leaves out
//! fall back to the worker's [`StorageConfig`], which is itself fed by the
//! `BUCKET_*` environment variables.

use crate::config::StorageConfig;
use crate::error::FetchError;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, ObjectStoreExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// The `s3Config` block of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    #[serde(default)]
    pub access_id: Option<String>,
    #[serde(default)]
    pub access_secret: Option<String>,
    #[serde(default)]
    pub bucket_name: Option<String>,
    /// Object key; only meaningful for downloads.
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub region_name: Option<String>,
}

/// Fully resolved bucket settings.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

impl S3Settings {
    pub fn resolve(config: &S3Config, defaults: &StorageConfig) -> Result<Self, FetchError> {
        let bucket = non_empty(config.bucket_name.as_ref())
            .ok_or_else(|| FetchError::InvalidReference("s3Config.bucketName is required".to_string()))?;
        let access_key_id = non_empty(config.access_id.as_ref())
            .or_else(|| non_empty(defaults.access_key_id.as_ref()))
            .ok_or_else(|| FetchError::Credentials("no access key id (accessId or BUCKET_ACCESS_KEY_ID)".to_string()))?;
        let secret_access_key = non_empty(config.access_secret.as_ref())
            .or_else(|| non_empty(defaults.secret_access_key.as_ref()))
            .ok_or_else(|| {
                FetchError::Credentials("no secret access key (accessSecret or BUCKET_SECRET_ACCESS_KEY)".to_string())
            })?;

        Ok(Self {
            bucket,
            region: non_empty(config.region_name.as_ref()).unwrap_or_else(|| defaults.default_region.clone()),
            endpoint_url: non_empty(config.endpoint_url.as_ref()).or_else(|| non_empty(defaults.endpoint_url.as_ref())),
            access_key_id,
            secret_access_key,
        })
    }

    /// Public URL prefix for objects in this bucket.
    #[must_use]
    pub fn url_base(&self) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }
}

/// A bucket handle plus the URL prefix its objects are reachable under.
#[derive(Clone)]
pub struct ObjectBucket {
    store: Arc<dyn ObjectStore>,
    url_base: String,
}

impl std::fmt::Debug for ObjectBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBucket").field("url_base", &self.url_base).finish_non_exhaustive()
    }
}

impl ObjectBucket {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, url_base: impl Into<String>) -> Self {
        Self { store, url_base: url_base.into() }
    }

    pub fn connect(settings: &S3Settings) -> Result<Self, FetchError> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region)
            .with_access_key_id(&settings.access_key_id)
            .with_secret_access_key(&settings.secret_access_key);
        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.with_endpoint(endpoint).with_allow_http(endpoint.starts_with("http://"));
        }
        let store = builder.build()?;
        Ok(Self::new(Arc::new(store), settings.url_base()))
    }

    #[must_use]
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.url_base.trim_end_matches('/'), key)
    }

    pub async fn download(&self, key: &str, dest: &Path) -> Result<(), FetchError> {
        info!(key = %key, "downloading object");
        let bytes = self.store.get(&ObjectPath::from(key)).await?.bytes().await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }

    /// Upload a local file and return its object URL.
    pub async fn upload_file(&self, key: &str, path: &Path) -> Result<String, FetchError> {
        let data = Bytes::from(tokio::fs::read(path).await?);
        info!(key = %key, bytes = data.len(), "uploading object");
        self.store.put(&ObjectPath::from(key), data.into()).await?;
        Ok(self.object_url(key))
    }
}

/// Opens buckets for jobs. Swappable so tests can run against in-memory stores.
pub trait BucketProvider: Send + Sync {
    fn open(&self, settings: &S3Settings) -> Result<ObjectBucket, FetchError>;
}

/// Opens real S3-compatible buckets.
#[derive(Debug, Default)]
pub struct S3BucketProvider;

impl BucketProvider for S3BucketProvider {
    fn open(&self, settings: &S3Settings) -> Result<ObjectBucket, FetchError> {
        ObjectBucket::connect(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn full_config() -> S3Config {
        serde_json::from_value(serde_json::json!({
            "accessId": "id",
            "accessSecret": "secret",
            "bucketName": "dreambooth-output",
            "fileName": "weights/model.zip",
            "endpointUrl": "https://account.r2.cloudflarestorage.com",
        }))
        .unwrap()
    }

    #[test]
    fn test_resolve_uses_job_values_and_default_region() {
        let settings = S3Settings::resolve(&full_config(), &StorageConfig::default()).unwrap();
        assert_eq!(settings.bucket, "dreambooth-output");
        assert_eq!(settings.region, "weur");
        assert_eq!(settings.access_key_id, "id");
        assert_eq!(
            settings.url_base(),
            "https://account.r2.cloudflarestorage.com/dreambooth-output"
        );
    }

    #[test]
    fn test_resolve_falls_back_to_worker_credentials() {
        let config = S3Config { bucket_name: Some("b".to_string()), ..Default::default() };
        let defaults = StorageConfig {
            endpoint_url: Some("http://localhost:9000".to_string()),
            access_key_id: Some("env-id".to_string()),
            secret_access_key: Some("env-secret".to_string()),
            ..Default::default()
        };

        let settings = S3Settings::resolve(&config, &defaults).unwrap();
        assert_eq!(settings.access_key_id, "env-id");
        assert_eq!(settings.secret_access_key, "env-secret");
        assert_eq!(settings.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert!(!format!("{settings:?}").contains("env-secret"));
    }

    #[test]
    fn test_resolve_requires_bucket_and_credentials() {
        let no_bucket = S3Config { access_id: Some("a".to_string()), ..Default::default() };
        assert!(matches!(
            S3Settings::resolve(&no_bucket, &StorageConfig::default()),
            Err(FetchError::InvalidReference(_))
        ));

        let no_secret = S3Config {
            bucket_name: Some("b".to_string()),
            access_id: Some("a".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            S3Settings::resolve(&no_secret, &StorageConfig::default()),
            Err(FetchError::Credentials(_))
        ));
    }

    #[test]
    fn test_url_base_without_endpoint() {
        let config = S3Config {
            bucket_name: Some("b".to_string()),
            access_id: Some("a".to_string()),
            access_secret: Some("s".to_string()),
            region_name: Some("us-east-1".to_string()),
            ..Default::default()
        };
        let settings = S3Settings::resolve(&config, &StorageConfig::default()).unwrap();
        assert_eq!(settings.url_base(), "https://b.s3.us-east-1.amazonaws.com");
    }

    #[tokio::test]
    async fn test_upload_then_download_roundtrip_in_memory() {
        let temp = tempfile::TempDir::new().unwrap();
        let bucket = ObjectBucket::new(Arc::new(InMemory::new()), "https://cdn.example.com/bucket/");

        let src = temp.path().join("image.png");
        std::fs::write(&src, b"png bytes").unwrap();
        let url = bucket.upload_file("job-1/0.png", &src).await.unwrap();
        assert_eq!(url, "https://cdn.example.com/bucket/job-1/0.png");

        let dest = temp.path().join("copy/image.png");
        bucket.download("job-1/0.png", &dest).await.unwrap();
        assert_eq!(std::fs::read(dest).unwrap(), b"png bytes");
    }
}
