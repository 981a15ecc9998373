use crate::job::TrainingJobId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { job_id: TrainingJobId, backend: String },
    Message { job_id: TrainingJobId, message: String },
    Finished { job_id: TrainingJobId },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Forwards progress to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { job_id, backend } => {
                tracing::info!(job_id = %job_id, backend = %backend, "started");
            }
            ProgressEvent::Message { job_id, message } => tracing::info!(job_id = %job_id, "{message}"),
            ProgressEvent::Finished { job_id } => tracing::info!(job_id = %job_id, "finished"),
        }
    }
}
