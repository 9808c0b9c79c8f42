//! Common types for LLM providers.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when interacting with a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    /// Missing, empty or rejected provider credential.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Provider error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Incremental text deltas produced by a streaming chat completion.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Provider trait for LLM backends.
///
/// Implementations provide chat completions and embeddings through
/// different backends (Gemini, Ollama, ...).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start a streaming chat completion.
    ///
    /// The returned future resolves only once the backend has accepted the
    /// request, so an `Ok` means generation has been initiated. The stream
    /// then yields text deltas in order.
    async fn chat_stream(&self, request: ChatRequest) -> Result<TokenStream>;

    /// Run a chat completion to the end and return the full text.
    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let stream = self.chat_stream(request).await?;
        stream.try_collect::<Vec<_>>().await.map(|parts| parts.concat())
    }

    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for several texts, preserving order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Name of the embedding model, recorded in the persisted index manifest.
    fn embedding_model(&self) -> &str;
}

/// Request for chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}
