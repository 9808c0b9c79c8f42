//! Destinations for evaluation records.

use super::{EvaluationRecord, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(&self, record: &EvaluationRecord) -> Result<()>;
}

/// Appends one JSON object per line to a file.
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn write(&self, record: &EvaluationRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Logs records as structured events.
pub struct TracingSink;

#[async_trait]
impl RecordSink for TracingSink {
    async fn write(&self, record: &EvaluationRecord) -> Result<()> {
        info!(
            record_id = %record.record_id,
            app_id = %record.app_id,
            latency_ms = record.latency_ms,
            feedback = ?record.feedback,
            "Evaluation recorded"
        );
        Ok(())
    }
}
