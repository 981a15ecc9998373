use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Noise scheduler used by the predictor. Inference jobs always run DDIM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scheduler {
    #[default]
    #[serde(rename = "DDIM")]
    Ddim,
}

/// The `infer` block of an inference job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceParams {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Init image reference (URL or local path) for img2img.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_prompt_strength")]
    pub prompt_strength: f64,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
    #[serde(default = "default_inference_steps")]
    pub num_inference_steps: u32,
    #[serde(default = "default_num_outputs")]
    pub num_outputs: u32,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default)]
    pub disable_safety_check: bool,
}

fn default_dimension() -> u32 {
    512
}

fn default_prompt_strength() -> f64 {
    0.8
}

fn default_guidance_scale() -> f64 {
    7.5
}

fn default_inference_steps() -> u32 {
    50
}

fn default_num_outputs() -> u32 {
    1
}

fn default_seed() -> i64 {
    512
}

impl InferenceParams {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.prompt.trim().is_empty() {
            return Err(TrainingError::InvalidSpec("infer.prompt is required".to_string()));
        }
        if self.num_outputs == 0 {
            return Err(TrainingError::InvalidSpec("infer.num_outputs must be >= 1".to_string()));
        }
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if value == 0 || value % 8 != 0 {
                return Err(TrainingError::InvalidSpec(format!(
                    "infer.{name} must be a positive multiple of 8, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.prompt_strength) {
            return Err(TrainingError::InvalidSpec("infer.prompt_strength must be within [0, 1]".to_string()));
        }
        if !self.guidance_scale.is_finite() {
            return Err(TrainingError::InvalidSpec("infer.guidance_scale must be finite".to_string()));
        }
        Ok(())
    }
}

/// Fully resolved request handed to a [`crate::Predictor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    /// Local path of the downloaded init image.
    pub image: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub prompt_strength: f64,
    pub guidance_scale: f64,
    pub num_inference_steps: u32,
    pub num_outputs: u32,
    pub seed: i64,
    pub disable_safety_check: bool,
    pub scheduler: Scheduler,
    /// Directory the predictor writes generated images into.
    pub output_dir: PathBuf,
}

impl PredictRequest {
    pub fn new(params: &InferenceParams, image: Option<PathBuf>, output_dir: PathBuf) -> TrainingResult<Self> {
        params.validate()?;
        Ok(Self {
            prompt: params.prompt.clone(),
            negative_prompt: params.negative_prompt.clone(),
            image,
            width: params.width,
            height: params.height,
            prompt_strength: params.prompt_strength,
            guidance_scale: params.guidance_scale,
            num_inference_steps: params.num_inference_steps,
            num_outputs: params.num_outputs,
            seed: params.seed,
            disable_safety_check: params.disable_safety_check,
            scheduler: Scheduler::Ddim,
            output_dir,
        })
    }
}
