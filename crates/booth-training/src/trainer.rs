use crate::error::TrainingResult;
use crate::inference::PredictRequest;
use crate::job::{TrainingConfig, TrainingJobId};
use crate::layout::JobLayout;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// What a training backend hands back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainingOutcome {
    /// Sample images rendered at checkpoints, in generation order.
    pub samples: Vec<PathBuf>,
}

/// A DreamBooth training backend.
#[async_trait]
pub trait Trainer: Send + Sync {
    fn id(&self) -> &'static str;

    async fn run(
        &self,
        job_id: &TrainingJobId,
        layout: &JobLayout,
        config: &TrainingConfig,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<TrainingOutcome>;
}

/// A long-lived image generation backend.
///
/// One instance serves many jobs, but not concurrently; callers serialize
/// `setup` + `predict` pairs.
#[async_trait]
pub trait Predictor: Send + Sync {
    fn id(&self) -> &'static str;

    /// Load (or reload) weights before a job. `None` keeps whatever is loaded.
    async fn setup(&self, weights: Option<&Path>) -> TrainingResult<()>;

    /// Generate images and return their paths in output order.
    async fn predict(&self, layout: &JobLayout, request: &PredictRequest) -> TrainingResult<Vec<PathBuf>>;
}
