use crate::error::TrainingResult;
use crate::job::{TrainingDirs, TrainingJobId};
use std::path::{Path, PathBuf};

/// Per-job scratch directory layout.
///
/// Every job works below `<root>/<job_id>/...` so repeated or concurrent jobs
/// never share dataset or checkpoint directories.
#[derive(Debug, Clone)]
pub struct JobLayout {
    job_dir: PathBuf,
}

impl JobLayout {
    #[must_use]
    pub fn new(root: &Path, job_id: &TrainingJobId) -> Self {
        Self { job_dir: root.join(job_id.0.as_str()) }
    }

    #[must_use]
    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        self.job_dir.join("temp")
    }

    #[must_use]
    pub fn weights_dir(&self) -> PathBuf {
        self.job_dir.join("weights")
    }

    #[must_use]
    pub fn instance_data_dir(&self) -> PathBuf {
        self.job_dir.join("instance_data")
    }

    #[must_use]
    pub fn class_data_dir(&self) -> PathBuf {
        self.job_dir.join("class_data")
    }

    #[must_use]
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.job_dir.join("checkpoints")
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.job_dir.join("logs")
    }

    /// Where predictors write generated images.
    #[must_use]
    pub fn outputs_dir(&self) -> PathBuf {
        self.job_dir.join("outputs")
    }

    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.job_dir.join("output.zip")
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.job_dir.join("training_manifest.json")
    }

    #[must_use]
    pub fn training_config_path(&self) -> PathBuf {
        self.job_dir.join("training_config.json")
    }

    #[must_use]
    pub fn training_result_path(&self) -> PathBuf {
        self.job_dir.join("training_result.json")
    }

    #[must_use]
    pub fn predict_request_path(&self) -> PathBuf {
        self.job_dir.join("predict_request.json")
    }

    #[must_use]
    pub fn predict_result_path(&self) -> PathBuf {
        self.job_dir.join("predict_result.json")
    }

    #[must_use]
    pub fn training_dirs(&self) -> TrainingDirs {
        TrainingDirs {
            instance_data_dir: self.instance_data_dir(),
            class_data_dir: self.class_data_dir(),
            output_dir: self.checkpoints_dir(),
            logging_dir: self.logs_dir(),
        }
    }

    /// Clear and recreate the dataset and checkpoint directories.
    pub fn reset_training_dirs(&self) -> TrainingResult<()> {
        for dir in [self.instance_data_dir(), self.class_data_dir(), self.checkpoints_dir()] {
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
            std::fs::create_dir_all(&dir)?;
        }
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }

    pub fn ensure_dirs(&self) -> TrainingResult<()> {
        std::fs::create_dir_all(&self.job_dir)?;
        std::fs::create_dir_all(self.temp_dir())?;
        Ok(())
    }

    /// Remove downloaded inputs and extracted datasets, keeping outputs.
    ///
    /// With `keep_weights`, the extracted weights directory survives so a
    /// predictor that still has it selected can keep loading from it.
    pub fn cleanup_inputs(&self, keep_weights: bool) -> TrainingResult<()> {
        let mut dirs = vec![self.temp_dir(), self.instance_data_dir(), self.class_data_dir()];
        if !keep_weights {
            dirs.push(self.weights_dir());
        }
        for dir in dirs {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
