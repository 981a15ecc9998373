//! Job handling.
//!
//! A [`Worker`] is built once per process and handles one job envelope at a
//! time. Each job runs in its own `<scratch_root>/<job_id>` directory and
//! either produces a [`JobOutput`] or a [`JobError`] naming the stage that
//! failed.

use crate::config::WorkerConfig;
use crate::error::{FetchError, JobError, JobStage};
use crate::fetch::{HttpFetcher, DOWNLOAD_TIMEOUT};
use crate::output::{inline_images, upload_images, ImageEntry};
use crate::process::{log_device_diagnostics, ProcessPredictor, ProcessTrainer};
use crate::storage::{BucketProvider, ObjectBucket, S3BucketProvider, S3Config, S3Settings};
use crate::weights::{WeightFetcher, WeightsSource};
use booth_training::artifacts::make_artifact;
use booth_training::job::PRETRAINED_MODEL;
use booth_training::{
    extract_images, package_directory, ArtifactKind, ConceptPrompts, InferenceParams, JobLayout, PredictRequest,
    Predictor, ProgressSink, SampleRequest, Trainer, TrainingConfig, TrainingHyperParams, TrainingJobId,
    TrainingManifest, TracingProgressSink,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// The serverless job envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub input: Value,
}

/// Training job input: prompts, datasets and hyperparameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingJobInput {
    pub instance_prompt: String,
    pub class_prompt: String,
    /// Zip archive of subject images (URL or local path).
    pub instance_data: String,
    #[serde(default)]
    pub class_data: Option<String>,
    #[serde(default)]
    pub samples: Vec<SampleRequest>,
    #[serde(default, rename = "s3Config")]
    pub s3_config: Option<S3Config>,
    #[serde(flatten)]
    pub hyperparams: TrainingHyperParams,
}

/// Inference job input.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceJobInput {
    #[serde(default)]
    pub weights: WeightsSource,
    pub infer: InferenceParams,
    #[serde(default, rename = "s3Config")]
    pub s3_config: Option<S3Config>,
}

#[derive(Debug, Clone)]
pub enum JobInput {
    Training(Box<TrainingJobInput>),
    Inference(Box<InferenceJobInput>),
}

impl JobInput {
    /// Inputs carrying an `infer` object are inference jobs; everything else trains.
    pub fn from_value(input: Value) -> Result<Self, JobError> {
        let Value::Object(map) = &input else {
            return Err(JobError::InvalidInput("job input must be a JSON object".to_string()));
        };

        if map.contains_key("infer") {
            serde_json::from_value(input)
                .map(|i| Self::Inference(Box::new(i)))
                .map_err(|e| JobError::InvalidInput(e.to_string()))
        } else {
            serde_json::from_value(input)
                .map(|i| Self::Training(Box::new(i)))
                .map_err(|e| JobError::InvalidInput(e.to_string()))
        }
    }
}

/// Successful job result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobOutput {
    Training { zip: String, samples: Vec<ImageEntry> },
    Inference { images: Vec<ImageEntry> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub stage: JobStage,
    pub message: String,
}

/// What the worker reports for a job: `{"output": ...}` or `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResponse {
    Output(JobOutput),
    Error(JobFailure),
}

impl JobResponse {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl From<Result<JobOutput, JobError>> for JobResponse {
    fn from(result: Result<JobOutput, JobError>) -> Self {
        match result {
            Ok(output) => Self::Output(output),
            Err(e) => Self::Error(JobFailure { stage: e.stage(), message: e.to_string() }),
        }
    }
}

/// Process-wide job handler.
pub struct Worker {
    config: WorkerConfig,
    http: HttpFetcher,
    trainer: Arc<dyn Trainer>,
    predictor: Arc<dyn Predictor>,
    buckets: Arc<dyn BucketProvider>,
    progress: Arc<dyn ProgressSink>,
    /// Weights directory the predictor currently has selected. Held for the
    /// whole setup + predict sequence.
    loaded_weights: Mutex<Option<PathBuf>>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("scratch_root", &self.config.scratch_root)
            .field("trainer", &self.trainer.id())
            .field("predictor", &self.predictor.id())
            .finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        trainer: Arc<dyn Trainer>,
        predictor: Arc<dyn Predictor>,
        buckets: Arc<dyn BucketProvider>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            config,
            http: HttpFetcher::new(DOWNLOAD_TIMEOUT)?,
            trainer,
            predictor,
            buckets,
            progress,
            loaded_weights: Mutex::new(None),
        })
    }

    /// Worker backed by the configured external programs and real S3 buckets.
    pub fn from_config(config: WorkerConfig) -> Result<Self, FetchError> {
        let trainer = Arc::new(ProcessTrainer::new(config.trainer.clone()));
        let predictor = Arc::new(ProcessPredictor::new(config.predictor.clone()));
        Self::new(config, trainer, predictor, Arc::new(S3BucketProvider), Arc::new(TracingProgressSink))
    }

    /// Run one job and report its outcome. Never panics on bad input.
    pub async fn handle(&self, job: Job) -> JobResponse {
        let job_id = TrainingJobId::from_external(job.id.as_deref());
        let layout = JobLayout::new(&self.config.scratch_root, &job_id);
        info!(job_id = %job_id, dir = %layout.job_dir().display(), "job received");

        let result = match JobInput::from_value(job.input) {
            Ok(JobInput::Training(input)) => self.train(&job_id, &layout, *input).await,
            Ok(JobInput::Inference(input)) => self.infer(&job_id, &layout, *input).await,
            Err(e) => Err(e),
        };

        if self.config.cleanup {
            let keep_weights = self.weights_in_use(&layout).await;
            if let Err(e) = layout.cleanup_inputs(keep_weights) {
                warn!(job_id = %job_id, error = %e, "failed to clean up job inputs");
            }
        }

        match &result {
            Ok(_) => info!(job_id = %job_id, "job complete"),
            Err(e) => warn!(job_id = %job_id, stage = %e.stage(), error = %e, "job failed"),
        }
        result.into()
    }

    pub async fn train(
        &self,
        job_id: &TrainingJobId,
        layout: &JobLayout,
        input: TrainingJobInput,
    ) -> Result<JobOutput, JobError> {
        let prompts = ConceptPrompts { instance_prompt: input.instance_prompt, class_prompt: input.class_prompt };
        let config = TrainingConfig::assemble(&input.hyperparams, &prompts, &layout.training_dirs(), input.samples)
            .map_err(|e| JobError::InvalidInput(e.to_string()))?;

        layout.ensure_dirs().map_err(|e| JobError::Acquisition(e.into()))?;
        let temp = layout.temp_dir();
        let instance_archive = self
            .http
            .resolve(&input.instance_data, &temp)
            .await
            .map_err(JobError::Acquisition)?;
        let class_archive = match input.class_data.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(reference) => Some(self.http.resolve(reference, &temp).await.map_err(JobError::Acquisition)?),
            None => None,
        };

        layout.reset_training_dirs().map_err(JobError::Extraction)?;
        let instance_images =
            extract_images(&instance_archive, &layout.instance_data_dir()).map_err(JobError::Extraction)?;
        if instance_images.is_empty() {
            return Err(JobError::Extraction(booth_training::TrainingError::Dataset(
                "instance_data contains no images".to_string(),
            )));
        }
        let class_images = match &class_archive {
            Some(archive) => extract_images(archive, &layout.class_data_dir()).map_err(JobError::Extraction)?.len(),
            None => 0,
        };
        info!(job_id = %job_id, instance_images = instance_images.len(), class_images, "dataset ready");

        let outcome = self
            .trainer
            .run(job_id, layout, &config, self.progress.as_ref())
            .await
            .map_err(JobError::Training)?;
        log_device_diagnostics(&self.config.diagnostics.command).await;

        let archive = package_directory(&layout.checkpoints_dir(), &layout.archive_path())
            .map_err(|e| JobError::Packaging(e.to_string()))?;
        let mut artifacts = vec![archive];
        for sample in &outcome.samples {
            artifacts.push(
                make_artifact(ArtifactKind::Sample, sample.clone()).map_err(|e| JobError::Packaging(e.to_string()))?,
            );
        }
        TrainingManifest {
            job_id: job_id.clone(),
            created_at: Utc::now(),
            base_model: PRETRAINED_MODEL.to_string(),
            artifacts,
        }
        .write(&layout.manifest_path())
        .map_err(|e| JobError::Packaging(e.to_string()))?;

        match &input.s3_config {
            Some(s3) => {
                let bucket = self.open_bucket(s3)?;
                let zip = bucket
                    .upload_file(&format!("{job_id}/output.zip"), &layout.archive_path())
                    .await
                    .map_err(JobError::Upload)?;
                let samples = upload_images(&bucket, job_id, &outcome.samples).await.map_err(JobError::Upload)?;
                Ok(JobOutput::Training { zip, samples })
            }
            None => Ok(JobOutput::Training {
                zip: layout.archive_path().to_string_lossy().into_owned(),
                samples: inline_images(&outcome.samples).map_err(|e| JobError::Packaging(e.to_string()))?,
            }),
        }
    }

    pub async fn infer(
        &self,
        job_id: &TrainingJobId,
        layout: &JobLayout,
        input: InferenceJobInput,
    ) -> Result<JobOutput, JobError> {
        input.infer.validate().map_err(|e| JobError::InvalidInput(e.to_string()))?;
        let reference = input
            .weights
            .reference()
            .ok_or_else(|| JobError::InvalidInput("weights requires download_url or s3Config".to_string()))?;

        layout.ensure_dirs().map_err(|e| JobError::Acquisition(e.into()))?;
        let fetcher = WeightFetcher { http: &self.http, buckets: self.buckets.as_ref(), storage: &self.config.storage };
        let weights = fetcher.acquire(&reference, layout).await.map_err(JobError::Acquisition)?;

        let image: Option<PathBuf> = match input.infer.image.as_deref().filter(|i| !i.trim().is_empty()) {
            Some(reference) => {
                Some(self.http.resolve(reference, &layout.temp_dir()).await.map_err(JobError::Acquisition)?)
            }
            None => None,
        };
        let request = PredictRequest::new(&input.infer, image, layout.outputs_dir())
            .map_err(|e| JobError::InvalidInput(e.to_string()))?;

        let images = {
            let mut loaded = self.loaded_weights.lock().await;
            self.predictor.setup(weights.as_deref()).await.map_err(JobError::Inference)?;
            if let Some(selected) = weights {
                let previous = loaded.replace(selected.clone());
                if self.config.cleanup
                    && let Some(previous) = previous.filter(|p| *p != selected)
                {
                    release_weights(&previous);
                }
            }
            self.predictor.predict(layout, &request).await.map_err(JobError::Inference)?
        };
        info!(job_id = %job_id, images = images.len(), "inference complete");

        let images = match &input.s3_config {
            Some(s3) => {
                let bucket = self.open_bucket(s3)?;
                upload_images(&bucket, job_id, &images).await.map_err(JobError::Upload)?
            }
            None => inline_images(&images).map_err(|e| JobError::Packaging(e.to_string()))?,
        };
        Ok(JobOutput::Inference { images })
    }

    /// Whether `layout`'s weights directory is the one the predictor has selected.
    async fn weights_in_use(&self, layout: &JobLayout) -> bool {
        let Ok(dir) = std::fs::canonicalize(layout.weights_dir()) else {
            return false;
        };
        self.loaded_weights.lock().await.as_deref() == Some(dir.as_path())
    }

    fn open_bucket(&self, s3: &S3Config) -> Result<ObjectBucket, JobError> {
        let settings = S3Settings::resolve(s3, &self.config.storage).map_err(JobError::Upload)?;
        self.buckets.open(&settings).map_err(JobError::Upload)
    }
}

/// Delete weights the predictor no longer has selected.
fn release_weights(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => info!(dir = %dir.display(), "released previous weights"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "failed to remove previous weights"),
    }
}
