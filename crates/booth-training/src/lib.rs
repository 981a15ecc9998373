//! Booth Training
//!
//! Backend-agnostic DreamBooth job primitives:
//! - Assembling the trainer configuration from job hyperparameters (`TrainingConfig`)
//! - Describing inference requests (`PredictRequest`)
//! - Preparing image datasets from zip archives
//! - Packaging checkpoints and writing manifests
//! - Implementing training and inference backends (`Trainer`, `Predictor`)

pub mod artifacts;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod job;
pub mod layout;
pub mod progress;
pub mod trainer;

pub use artifacts::{package_directory, ArtifactKind, TrainingArtifact, TrainingManifest};
pub use dataset::{extract_all, extract_images, is_image_entry};
pub use error::{TrainingError, TrainingResult};
pub use inference::{InferenceParams, PredictRequest, Scheduler};
pub use job::{
    ConceptPrompts, LrScheduler, SampleRequest, TrainingConfig, TrainingDirs, TrainingHyperParams,
    TrainingJobId,
};
pub use layout::JobLayout;
pub use progress::{ProgressEvent, ProgressSink, TracingProgressSink};
pub use trainer::{Predictor, Trainer, TrainingOutcome};
