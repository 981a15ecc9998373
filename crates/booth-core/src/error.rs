//! Error types for job handling.

use booth_training::TrainingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while moving bytes in or out of the worker.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP transport or status errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Object storage errors
    #[error("Object storage error: {0}")]
    Store(#[from] object_store::Error),

    /// Missing or unusable storage credentials
    #[error("Missing storage credentials: {0}")]
    Credentials(String),

    /// A reference that names nothing we can fetch
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Archive handling errors
    #[error("Archive error: {0}")]
    Archive(#[from] TrainingError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline stage a job failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Input,
    Acquisition,
    Extraction,
    Training,
    Inference,
    Packaging,
    Upload,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Input => "input",
            Self::Acquisition => "acquisition",
            Self::Extraction => "extraction",
            Self::Training => "training",
            Self::Inference => "inference",
            Self::Packaging => "packaging",
            Self::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// A job failure, tagged with the stage that produced it.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job input: {0}")]
    InvalidInput(String),

    #[error("weight or input acquisition failed: {0}")]
    Acquisition(#[source] FetchError),

    #[error("dataset extraction failed: {0}")]
    Extraction(#[source] TrainingError),

    #[error("training failed: {0}")]
    Training(#[source] TrainingError),

    #[error("inference failed: {0}")]
    Inference(#[source] TrainingError),

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("upload failed: {0}")]
    Upload(#[source] FetchError),
}

impl JobError {
    #[must_use]
    pub fn stage(&self) -> JobStage {
        match self {
            Self::InvalidInput(_) => JobStage::Input,
            Self::Acquisition(_) => JobStage::Acquisition,
            Self::Extraction(_) => JobStage::Extraction,
            Self::Training(_) => JobStage::Training,
            Self::Inference(_) => JobStage::Inference,
            Self::Packaging(_) => JobStage::Packaging,
            Self::Upload(_) => JobStage::Upload,
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
