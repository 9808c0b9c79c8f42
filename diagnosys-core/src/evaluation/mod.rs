//! Optional evaluation of single-shot answers.
//!
//! [`Recorder::instrumented_query`] decorates a [`QueryEngine::query`] call:
//! the answer is returned as soon as it exists, and scoring runs in a
//! background task that writes an [`EvaluationRecord`] to a [`RecordSink`].
//! The pipeline works the same with or without a recorder.

mod feedback;
mod sink;

pub use feedback::{parse_score, Feedback, Judge};
pub use sink::{JsonlSink, RecordSink, TracingSink};

use crate::config::Config;
use crate::provider::{Message, Provider, ProviderError};
use crate::query::{self, Answer, QueryEngine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Judge reply contained no score: {0:?}")]
    UnparsableScore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EvaluationError>;

/// One scored question/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub record_id: Uuid,
    pub app_id: String,
    pub input: String,
    pub output: String,
    pub sources: Vec<String>,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
    /// Feedback name to score in 0.0-1.0. Failed feedbacks are absent.
    pub feedback: BTreeMap<String, f64>,
}

#[derive(Clone)]
pub struct Recorder {
    judge: Judge,
    app_id: String,
    sink: Arc<dyn RecordSink>,
    tasks: TaskTracker,
}

impl Recorder {
    pub fn new(judge: Judge, app_id: impl Into<String>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            judge,
            app_id: app_id.into(),
            sink,
            tasks: TaskTracker::new(),
        }
    }

    /// Recorder writing to `evaluation.records_path`, judged by
    /// [`Config::evaluation_model`].
    pub fn from_config(provider: Arc<dyn Provider>, config: &Config) -> Self {
        Self::new(
            Judge::new(provider, config.evaluation_model()),
            config.evaluation.app_id.clone(),
            Arc::new(JsonlSink::new(config.evaluation.records_path.clone())),
        )
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Runs a single-shot query and schedules its evaluation.
    pub async fn instrumented_query(
        &self,
        engine: &QueryEngine,
        query: &str,
        history: &[Message],
    ) -> query::Result<Answer> {
        let started = Instant::now();
        let answer = engine.query(query, history).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let recorder = self.clone();
        let input = query.to_string();
        let recorded = answer.clone();
        self.tasks.spawn(async move {
            if let Err(e) = recorder.record(input, &recorded, latency_ms).await {
                warn!("Failed to record evaluation: {}", e);
            }
        });

        Ok(answer)
    }

    /// Scores `answer` with every feedback function and writes the record.
    pub async fn record(&self, input: String, answer: &Answer, latency_ms: u64) -> Result<EvaluationRecord> {
        let sources: Vec<String> = answer.sources.iter().map(|s| s.passage.text.clone()).collect();

        let mut feedback = BTreeMap::new();
        for kind in Feedback::ALL {
            match self.judge.evaluate(kind, &input, &answer.text, &sources).await {
                Ok(score) => {
                    feedback.insert(kind.name().to_string(), score);
                }
                Err(e) => warn!("Feedback {} failed: {}", kind, e),
            }
        }

        let record = EvaluationRecord {
            record_id: Uuid::new_v4(),
            app_id: self.app_id.clone(),
            input,
            output: answer.text.clone(),
            sources,
            latency_ms,
            timestamp: Utc::now(),
            feedback,
        };

        self.sink.write(&record).await?;
        debug!(record_id = %record.record_id, "Evaluation written");
        Ok(record)
    }

    /// Waits for every scheduled evaluation to finish.
    pub async fn flush(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;
    use crate::test_support::sample_index;

    #[tokio::test]
    async fn test_instrumented_query_records_all_feedbacks() {
        let tmp = tempfile::tempdir().unwrap();
        let records = tmp.path().join("evaluations.jsonl");

        let provider = Arc::new(MockProvider::new().with_reply("Letters are rectangular."));
        let engine = QueryEngine::new(sample_index(provider.clone()).await, provider, &Config::default());

        let judge = Judge::new(Arc::new(MockProvider::new().with_reply("8")), "judge");
        let recorder = Recorder::new(judge, "Diagnosys", Arc::new(JsonlSink::new(&records)));

        let answer = recorder
            .instrumented_query(&engine, "What are Dimensional Standards for Letters?", &[])
            .await
            .unwrap();
        assert_eq!(answer.text, "Letters are rectangular.");

        recorder.flush().await;

        let contents = std::fs::read_to_string(&records).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);

        let record: EvaluationRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record.app_id, "Diagnosys");
        assert_eq!(record.input, "What are Dimensional Standards for Letters?");
        assert_eq!(record.output, "Letters are rectangular.");
        assert_eq!(record.sources.len(), 2);
        for kind in Feedback::ALL {
            assert!((record.feedback[kind.name()] - 0.8).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_failed_feedback_is_left_out() {
        let judge = Judge::new(Arc::new(MockProvider::new().with_reply("no score")), "judge");
        let recorder = Recorder::new(judge, "Diagnosys", Arc::new(TracingSink));
        let answer = Answer {
            text: "An answer.".to_string(),
            sources: Vec::new(),
        };

        let record = recorder.record("q".to_string(), &answer, 5).await.unwrap();

        // context relevance over zero sources needs no judge call
        assert_eq!(record.feedback.len(), 1);
        assert_eq!(record.feedback["context_relevance"], 0.0);
    }

    #[tokio::test]
    async fn test_query_failure_skips_recording() {
        let tmp = tempfile::tempdir().unwrap();
        let records = tmp.path().join("evaluations.jsonl");

        let provider = Arc::new(MockProvider::new().failing("down"));
        let engine = QueryEngine::new(sample_index(provider.clone()).await, provider.clone(), &Config::default());
        let recorder = Recorder::new(Judge::new(provider, "judge"), "Diagnosys", Arc::new(JsonlSink::new(&records)));

        assert!(recorder.instrumented_query(&engine, "q", &[]).await.is_err());
        recorder.flush().await;
        assert!(!records.exists());
    }
}
