//! HTTP downloads for weights and job inputs.

use crate::error::FetchError;
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

/// Connect timeout, and the longest a download may sit idle between reads.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Extension of the last path segment, without the dot (`"zip"`, `"png"`, or `""`).
#[must_use]
pub fn file_extension(name: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    Path::new(base)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Fresh file name in the form `<uuid>.<ext>` (or `<uuid>` without an extension).
#[must_use]
pub fn scratch_file_name(extension: &str) -> String {
    if extension.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        format!("{}.{extension}", Uuid::new_v4())
    }
}

#[must_use]
pub fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Downloads URLs into a scratch directory.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("booth/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Download `url` into `dir` under a fresh name that keeps the URL's extension.
    ///
    /// The body is streamed to disk; there is no deadline on the whole transfer.
    pub async fn download(&self, url: &str, dir: &Path) -> Result<PathBuf, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| FetchError::InvalidReference(format!("{url}: {e}")))?;
        let extension = file_extension(parsed.path());

        info!(url = %url, "downloading");
        let response = self.client.get(parsed).send().await?.error_for_status()?;

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(scratch_file_name(&extension));
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written = 0usize;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!(path = %path.display(), bytes = written, "download complete");
        Ok(path)
    }

    /// Resolve a job input reference: URLs are downloaded into `dir`, local paths must exist.
    pub async fn resolve(&self, reference: &str, dir: &Path) -> Result<PathBuf, FetchError> {
        if is_remote(reference) {
            return self.download(reference, dir).await;
        }

        let path = PathBuf::from(reference);
        if !path.exists() {
            return Err(FetchError::InvalidReference(format!("input not found: {reference}")));
        }
        Ok(path)
    }
}
