//! Booth Core - DreamBooth fine-tuning worker.
//!
//! This crate wires the job primitives from `booth-training` into a worker:
//! - Worker configuration (`WorkerConfig`)
//! - Weight and dataset acquisition over HTTP and S3-compatible storage
//! - External trainer and predictor processes
//! - Job handling with stage-tagged failures
//!
//! # Example
//!
//! ```rust,no_run
//! use booth_core::{Job, Worker, WorkerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let worker = Worker::from_config(WorkerConfig::discover_and_load(None)?)?;
//!     let job: Job = serde_json::from_str(r#"{"input": {"infer": {"prompt": "sks dog"}}}"#)?;
//!     println!("{}", serde_json::to_string(&worker.handle(job).await)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod handler;
pub mod output;
pub mod process;
pub mod storage;
pub mod weights;

pub use config::{CommandConfig, DiagnosticsConfig, StorageConfig, WorkerConfig};
pub use error::{ConfigError, ConfigResult, FetchError, JobError, JobStage};
pub use fetch::HttpFetcher;
pub use handler::{
    InferenceJobInput, Job, JobFailure, JobInput, JobOutput, JobResponse, TrainingJobInput, Worker,
};
pub use output::ImageEntry;
pub use process::{log_device_diagnostics, ProcessPredictor, ProcessTrainer};
pub use storage::{BucketProvider, ObjectBucket, S3BucketProvider, S3Config, S3Settings};
pub use weights::{WeightFetcher, WeightReference, WeightsSource};
