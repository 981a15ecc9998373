//! Child-process training and inference backends.
//!
//! The ML entry points are external programs. Each invocation gets its
//! arguments as a JSON file and reports back through a JSON result file:
//!
//! ```text
//! <program> <args...> --config  <job>/training_config.json --result <job>/training_result.json
//! <program> <args...> --request <job>/predict_request.json --result <job>/predict_result.json [--weights <dir>]
//! ```
//!
//! Lines the child prints on stdout are forwarded as progress messages.

use crate::config::CommandConfig;
use async_trait::async_trait;
use booth_training::{
    JobLayout, PredictRequest, Predictor, ProgressEvent, ProgressSink, Trainer, TrainingConfig, TrainingError,
    TrainingJobId, TrainingOutcome, TrainingResult,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct TrainingResultFile {
    #[serde(default)]
    samples: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct PredictResultFile {
    #[serde(default)]
    images: Vec<PathBuf>,
}

fn command(config: &CommandConfig, cwd: &Path) -> Command {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    cmd
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> TrainingResult<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn remove_stale(path: &Path) -> TrainingResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn read_result<T: for<'de> Deserialize<'de>>(path: &Path, program: &str) -> TrainingResult<T> {
    if !path.exists() {
        return Err(TrainingError::Trainer(format!(
            "{program} exited without writing {}",
            path.display()
        )));
    }
    Ok(serde_json::from_slice(&std::fs::read(path)?)?)
}

fn resolve_paths(paths: Vec<PathBuf>, base: &Path) -> Vec<PathBuf> {
    paths
        .into_iter()
        .map(|p| if p.is_absolute() { p } else { base.join(p) })
        .collect()
}

/// Wait for `child`, forwarding its stdout, and kill it on Ctrl-C.
async fn supervise(
    mut child: Child,
    program: &str,
    job_id: &TrainingJobId,
    progress: &dyn ProgressSink,
) -> TrainingResult<ExitStatus> {
    let stdout = child.stdout.take();
    let run = async {
        if let Some(stdout) = stdout {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let message = line.trim_end_matches(['\n', '\r']).to_string();
                        progress.on_event(ProgressEvent::Message { job_id: job_id.clone(), message });
                    }
                    Err(e) => {
                        warn!(program = %program, error = %e, "stopped reading child output");
                        break;
                    }
                }
            }
        }
        child.wait().await
    };

    tokio::select! {
        status = run => Ok(status?),
        _ = tokio::signal::ctrl_c() => {
            warn!(program = %program, "interrupted, stopping child process");
            Err(TrainingError::Interrupted(program.to_string()))
        }
    }
}

async fn run_checked(
    mut cmd: Command,
    program: &str,
    job_id: &TrainingJobId,
    progress: &dyn ProgressSink,
) -> TrainingResult<()> {
    let child = cmd
        .spawn()
        .map_err(|e| TrainingError::Trainer(format!("failed to start {program}: {e}")))?;
    let status = supervise(child, program, job_id, progress).await?;
    if !status.success() {
        return Err(TrainingError::Trainer(format!("{program} exited with {status}")));
    }
    Ok(())
}

/// Runs the external DreamBooth training entry point.
#[derive(Debug, Clone)]
pub struct ProcessTrainer {
    command: CommandConfig,
}

impl ProcessTrainer {
    #[must_use]
    pub fn new(command: CommandConfig) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Trainer for ProcessTrainer {
    fn id(&self) -> &'static str {
        "process"
    }

    async fn run(
        &self,
        job_id: &TrainingJobId,
        layout: &JobLayout,
        config: &TrainingConfig,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<TrainingOutcome> {
        let config_path = layout.training_config_path();
        let result_path = layout.training_result_path();
        write_json(&config_path, config)?;
        remove_stale(&result_path)?;

        progress.on_event(ProgressEvent::Started {
            job_id: job_id.clone(),
            backend: self.command.program.clone(),
        });

        let mut cmd = command(&self.command, layout.job_dir());
        cmd.arg("--config").arg(&config_path).arg("--result").arg(&result_path);
        run_checked(cmd, &self.command.program, job_id, progress).await?;

        let result: TrainingResultFile = read_result(&result_path, &self.command.program)?;
        progress.on_event(ProgressEvent::Finished { job_id: job_id.clone() });
        Ok(TrainingOutcome { samples: resolve_paths(result.samples, layout.job_dir()) })
    }
}

/// Runs the external inference entry point.
///
/// `setup` only records which weights the next `predict` should load.
#[derive(Debug)]
pub struct ProcessPredictor {
    command: CommandConfig,
    weights: Mutex<Option<PathBuf>>,
    progress: booth_training::TracingProgressSink,
}

impl ProcessPredictor {
    #[must_use]
    pub fn new(command: CommandConfig) -> Self {
        Self { command, weights: Mutex::new(None), progress: booth_training::TracingProgressSink }
    }

    fn loaded_weights(&self) -> Option<PathBuf> {
        self.weights.lock().ok().and_then(|w| w.clone())
    }
}

#[async_trait]
impl Predictor for ProcessPredictor {
    fn id(&self) -> &'static str {
        "process"
    }

    async fn setup(&self, weights: Option<&Path>) -> TrainingResult<()> {
        let Some(weights) = weights else {
            return Ok(());
        };
        if !weights.is_dir() {
            return Err(TrainingError::Trainer(format!(
                "weights directory does not exist: {}",
                weights.display()
            )));
        }
        if let Ok(mut loaded) = self.weights.lock() {
            *loaded = Some(weights.to_path_buf());
        }
        debug!(weights = %weights.display(), "predictor weights selected");
        Ok(())
    }

    async fn predict(&self, layout: &JobLayout, request: &PredictRequest) -> TrainingResult<Vec<PathBuf>> {
        let request_path = layout.predict_request_path();
        let result_path = layout.predict_result_path();
        std::fs::create_dir_all(&request.output_dir)?;
        write_json(&request_path, request)?;
        remove_stale(&result_path)?;

        let mut cmd = command(&self.command, layout.job_dir());
        cmd.arg("--request").arg(&request_path).arg("--result").arg(&result_path);
        if let Some(weights) = self.loaded_weights() {
            cmd.arg("--weights").arg(weights);
        }

        let job_id = TrainingJobId(
            layout
                .job_dir()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        run_checked(cmd, &self.command.program, &job_id, &self.progress).await?;

        let result: PredictResultFile = read_result(&result_path, &self.command.program)?;
        Ok(resolve_paths(result.images, layout.job_dir()))
    }
}

/// Run the device diagnostics command and log what it prints. Never fails.
pub async fn log_device_diagnostics(command: &[String]) {
    let Some((program, args)) = command.split_first() else {
        return;
    };

    match Command::new(program).args(args).stdin(Stdio::null()).output().await {
        Ok(output) if output.status.success() => {
            info!("{}", String::from_utf8_lossy(&output.stdout).trim_end());
        }
        Ok(output) => warn!(program = %program, status = %output.status, "device diagnostics failed"),
        Err(e) => warn!(program = %program, error = %e, "device diagnostics unavailable"),
    }
}
