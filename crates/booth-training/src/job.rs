use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Base diffusion model every job fine-tunes.
pub const PRETRAINED_MODEL: &str = "runwayml/stable-diffusion-v1-5";
/// VAE swapped into the base model.
pub const PRETRAINED_VAE: &str = "stabilityai/sd-vae-ft-mse";
/// Weights revision pulled from the hub.
pub const MODEL_REVISION: &str = "fp16";
/// Precision mode the trainer always runs with.
pub const MIXED_PRECISION: &str = "fp16";

/// Identifier for a job, used to name its scratch directory and uploaded objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingJobId(pub String);

impl TrainingJobId {
    /// Use a caller-supplied id, falling back to a fresh one when it cannot name a directory.
    #[must_use]
    pub fn from_external(id: Option<&str>) -> Self {
        match id.map(str::trim) {
            Some(id)
                if !id.is_empty()
                    && id != "."
                    && id != ".."
                    && !id.contains(['/', '\\']) =>
            {
                Self(id.to_string())
            }
            _ => Self(Uuid::new_v4().to_string()),
        }
    }
}

impl std::fmt::Display for TrainingJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LrScheduler {
    Linear,
    Cosine,
    CosineWithRestarts,
    Polynomial,
    #[default]
    Constant,
    ConstantWithWarmup,
}

/// Prompt settings for images the trainer renders at checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
    #[serde(default = "default_inference_steps")]
    pub inference_steps: u32,
    #[serde(default = "default_num_outputs")]
    pub num_outputs: u32,
    #[serde(default)]
    pub seed: Option<i64>,
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

/// Hyperparameters a job may set. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingHyperParams {
    pub num_train_epochs: u32,
    /// Overrides `num_train_epochs` when reached first.
    pub max_train_steps: u32,
    pub train_batch_size: u32,
    pub sample_batch_size: u32,
    pub gradient_accumulation_steps: u32,
    pub gradient_checkpointing: bool,
    pub learning_rate: f64,
    pub scale_lr: bool,
    pub lr_scheduler: LrScheduler,
    pub lr_warmup_steps: u32,
    pub resolution: u32,
    pub center_crop: bool,
    pub use_8bit_adam: bool,
    pub with_prior_preservation: bool,
    pub prior_loss_weight: f64,
    pub train_text_encoder: bool,
    pub pad_tokens: bool,
    pub num_class_images: u32,
    pub save_sample_prompt: Option<String>,
    pub save_sample_negative_prompt: Option<String>,
    pub n_save_sample: u32,
    pub save_guidance_scale: f64,
    pub save_infer_steps: u32,
    pub seed: i64,
    pub adam_beta1: f64,
    pub adam_beta2: f64,
    pub adam_weight_decay: f64,
    pub adam_epsilon: f64,
    pub max_grad_norm: f64,
}

impl Default for TrainingHyperParams {
    fn default() -> Self {
        Self {
            num_train_epochs: 1,
            max_train_steps: 2000,
            train_batch_size: 1,
            sample_batch_size: 4,
            gradient_accumulation_steps: 1,
            gradient_checkpointing: false,
            learning_rate: 1e-6,
            scale_lr: false,
            lr_scheduler: LrScheduler::Constant,
            lr_warmup_steps: 0,
            resolution: 512,
            center_crop: false,
            use_8bit_adam: false,
            with_prior_preservation: true,
            prior_loss_weight: 1.0,
            train_text_encoder: true,
            pad_tokens: false,
            num_class_images: 50,
            save_sample_prompt: None,
            save_sample_negative_prompt: None,
            n_save_sample: 4,
            save_guidance_scale: 7.5,
            save_infer_steps: 50,
            seed: 1337,
            adam_beta1: 0.9,
            adam_beta2: 0.999,
            adam_weight_decay: 1e-2,
            adam_epsilon: 1e-8,
            max_grad_norm: 1.0,
        }
    }
}

impl TrainingHyperParams {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.num_train_epochs == 0 {
            return Err(TrainingError::InvalidSpec("num_train_epochs must be >= 1".to_string()));
        }
        if self.max_train_steps == 0 {
            return Err(TrainingError::InvalidSpec("max_train_steps must be >= 1".to_string()));
        }
        if self.train_batch_size == 0 || self.sample_batch_size == 0 {
            return Err(TrainingError::InvalidSpec("batch sizes must be >= 1".to_string()));
        }
        if self.gradient_accumulation_steps == 0 {
            return Err(TrainingError::InvalidSpec(
                "gradient_accumulation_steps must be >= 1".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidSpec("learning_rate must be > 0".to_string()));
        }
        if self.resolution == 0 {
            return Err(TrainingError::InvalidSpec("resolution must be >= 1".to_string()));
        }
        if !self.prior_loss_weight.is_finite() || self.prior_loss_weight < 0.0 {
            return Err(TrainingError::InvalidSpec("prior_loss_weight must be >= 0".to_string()));
        }
        Ok(())
    }
}

/// Instance and class prompts for one fine-tuning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptPrompts {
    pub instance_prompt: String,
    pub class_prompt: String,
}

impl ConceptPrompts {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.instance_prompt.trim().is_empty() {
            return Err(TrainingError::InvalidSpec("instance_prompt is required".to_string()));
        }
        if self.class_prompt.trim().is_empty() {
            return Err(TrainingError::InvalidSpec("class_prompt is required".to_string()));
        }
        Ok(())
    }
}

/// Directories the trainer reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingDirs {
    pub instance_data_dir: PathBuf,
    pub class_data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub logging_dir: PathBuf,
}

/// Flat argument record handed to the external trainer.
///
/// Built only through [`TrainingConfig::assemble`]; the deployment block
/// (base model, VAE, revision, precision, hub settings) is never taken from the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub num_train_epochs: u32,
    pub max_train_steps: u32,

    pub pretrained_model_name_or_path: String,
    pub pretrained_vae_name_or_path: String,
    pub revision: String,
    pub tokenizer_name: Option<String>,
    pub instance_data_dir: PathBuf,
    pub class_data_dir: PathBuf,
    pub instance_prompt: String,
    pub class_prompt: String,
    pub save_sample_prompt: Option<String>,
    pub save_sample_negative_prompt: Option<String>,
    pub n_save_sample: u32,
    pub save_guidance_scale: f64,
    pub save_infer_steps: u32,
    pub pad_tokens: bool,
    pub with_prior_preservation: bool,
    pub prior_loss_weight: f64,
    pub num_class_images: u32,
    pub seed: i64,
    pub resolution: u32,
    pub center_crop: bool,
    pub train_text_encoder: bool,
    pub train_batch_size: u32,
    pub sample_batch_size: u32,

    pub gradient_accumulation_steps: u32,
    pub gradient_checkpointing: bool,
    pub learning_rate: f64,
    pub scale_lr: bool,
    pub lr_scheduler: LrScheduler,
    pub lr_warmup_steps: u32,
    pub use_8bit_adam: bool,
    pub adam_beta1: f64,
    pub adam_beta2: f64,
    pub adam_weight_decay: f64,
    pub adam_epsilon: f64,
    pub max_grad_norm: f64,
    pub push_to_hub: bool,
    pub hub_token: Option<String>,
    pub hub_model_id: Option<String>,
    pub save_interval: u32,
    pub save_min_steps: u32,
    pub mixed_precision: String,
    pub not_cache_latents: bool,
    pub local_rank: i32,
    pub output_dir: PathBuf,
    pub concepts_list: Option<PathBuf>,
    pub logging_dir: PathBuf,
    pub log_interval: u32,
    pub hflip: bool,
    pub samples: Vec<SampleRequest>,
}

impl TrainingConfig {
    /// Merge job hyperparameters with the fixed deployment settings.
    pub fn assemble(
        hyper: &TrainingHyperParams,
        prompts: &ConceptPrompts,
        dirs: &TrainingDirs,
        samples: Vec<SampleRequest>,
    ) -> TrainingResult<Self> {
        hyper.validate()?;
        prompts.validate()?;

        Ok(Self {
            num_train_epochs: hyper.num_train_epochs,
            max_train_steps: hyper.max_train_steps,

            pretrained_model_name_or_path: PRETRAINED_MODEL.to_string(),
            pretrained_vae_name_or_path: PRETRAINED_VAE.to_string(),
            revision: MODEL_REVISION.to_string(),
            tokenizer_name: None,
            instance_data_dir: dirs.instance_data_dir.clone(),
            class_data_dir: dirs.class_data_dir.clone(),
            instance_prompt: prompts.instance_prompt.clone(),
            class_prompt: prompts.class_prompt.clone(),
            save_sample_prompt: hyper.save_sample_prompt.clone(),
            save_sample_negative_prompt: hyper.save_sample_negative_prompt.clone(),
            n_save_sample: hyper.n_save_sample,
            save_guidance_scale: hyper.save_guidance_scale,
            save_infer_steps: hyper.save_infer_steps,
            pad_tokens: hyper.pad_tokens,
            with_prior_preservation: hyper.with_prior_preservation,
            prior_loss_weight: hyper.prior_loss_weight,
            num_class_images: hyper.num_class_images,
            seed: hyper.seed,
            resolution: hyper.resolution,
            center_crop: hyper.center_crop,
            train_text_encoder: hyper.train_text_encoder,
            train_batch_size: hyper.train_batch_size,
            sample_batch_size: hyper.sample_batch_size,

            gradient_accumulation_steps: hyper.gradient_accumulation_steps,
            gradient_checkpointing: hyper.gradient_checkpointing,
            learning_rate: hyper.learning_rate,
            scale_lr: hyper.scale_lr,
            lr_scheduler: hyper.lr_scheduler,
            lr_warmup_steps: hyper.lr_warmup_steps,
            use_8bit_adam: hyper.use_8bit_adam,
            adam_beta1: hyper.adam_beta1,
            adam_beta2: hyper.adam_beta2,
            adam_weight_decay: hyper.adam_weight_decay,
            adam_epsilon: hyper.adam_epsilon,
            max_grad_norm: hyper.max_grad_norm,
            push_to_hub: false,
            hub_token: None,
            hub_model_id: None,
            save_interval: 10_000, // checkpoints are only taken at the end
            save_min_steps: 0,
            mixed_precision: MIXED_PRECISION.to_string(),
            not_cache_latents: false,
            local_rank: -1,
            output_dir: dirs.output_dir.clone(),
            concepts_list: None,
            logging_dir: dirs.logging_dir.clone(),
            log_interval: 10,
            hflip: false,
            samples,
        })
    }
}
