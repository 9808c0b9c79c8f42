//! Embedding generation using LLM providers.
//!
//! This module provides functionality to convert text into vector embeddings
//! using provider embedding models.

use crate::provider::{Provider, ProviderError};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Number of texts sent to the provider per embedding call.
pub const BATCH_SIZE: usize = 32;

/// Errors that can occur during embedding generation.
#[derive(Debug, Error)]
pub enum EmbedderError {
    /// The provider API returned an error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The provider answered with a different number of vectors than requested.
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedderError>;

/// Generates vector embeddings for text through a [`Provider`].
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn Provider>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    pub fn model(&self) -> &str {
        self.provider.embedding_model()
    }

    /// Generates a vector embedding for the given text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.provider.embed(text).await?)
    }

    /// Embeds `texts` in batches of [`BATCH_SIZE`], preserving order.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(BATCH_SIZE) {
            debug!("Embedding batch of {} texts", batch.len());
            let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
            let vectors = self.provider.embed_batch(&refs).await?;
            if vectors.len() != batch.len() {
                return Err(EmbedderError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }
}
