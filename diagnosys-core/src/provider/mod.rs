//! LLM provider abstraction layer.
//!
//! This module defines a common interface for different LLM backends
//! (Gemini, Ollama) to provide chat completions and embeddings.

mod types;
pub mod gemini;
pub mod mock;
pub mod ollama;

use crate::config::{Config, ProviderKind};
use std::sync::Arc;

// Re-export common types
pub use types::{ChatRequest, Message, Provider, ProviderError, Result, TokenStream};

// Re-export provider implementations
pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;

/// Builds the provider selected by `llm.provider`.
///
/// For Gemini the credential is read here, so a missing key fails at startup
/// with [`ProviderError::Authentication`].
pub fn create_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    match config.llm.provider {
        ProviderKind::Gemini => Ok(Arc::new(GeminiProvider::from_env(config)?)),
        ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::new(config)?)),
    }
}
