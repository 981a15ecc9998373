//! Run command implementation.

use anyhow::{Context, Result, bail};
use booth_core::{Job, JobResponse, Worker, WorkerConfig};
use std::io::Read;

fn read_job(source: &str) -> Result<Job> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("Failed to read job from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read job file {source}"))?
    };
    serde_json::from_str(&raw).context("Job is not a valid JSON envelope")
}

/// Execute the run command.
///
/// The response is printed even when the job fails; the exit status reports the failure.
pub async fn execute(config: WorkerConfig, source: &str) -> Result<()> {
    let job = read_job(source)?;
    let worker = Worker::from_config(config).context("Failed to initialize worker")?;

    let response = worker.handle(job).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if let JobResponse::Error(failure) = &response {
        bail!("job failed in {} stage", failure.stage);
    }
    Ok(())
}
