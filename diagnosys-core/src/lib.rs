//! diagnosys-core - Retrieval-augmented question answering backend
//!
//! Provides the building blocks of the Diagnosys service:
//! - LLM provider abstraction (Gemini, Ollama, in-process mock)
//! - Document loading and a persisted vector index with build-or-load caching
//! - Chat request validation with clinical-history form templating
//! - Answer streaming pipeline with optional evaluation
//! - HTTP server (primary interface)
//!
//! ## Primary API
//!
//! Most users start the service through [`Server`], which obtains the index
//! once at startup and shares it with every request.

// Public modules
pub mod chat;
pub mod config;
pub mod evaluation;
pub mod index;
pub mod loader;
pub mod patterns;
pub mod pipeline;
pub mod provider;
pub mod query;
pub mod server;

#[cfg(test)]
mod test_support;

// Public exports
pub use chat::{normalize, ChatError, ChatTurn, FormData, FormField, FormTemplate, NormalizedChat, Role};
pub use config::{Config, IndexerConfig, ResponseMode};
pub use evaluation::{EvaluationRecord, Recorder};
pub use index::{IndexCache, IndexError, IndexHandle, VectorIndex};
pub use pipeline::{AnswerBody, AnswerPipeline, RelayOutcome};
pub use query::{Answer, QueryEngine, QueryError};
pub use server::{AppState, Server, ServerError};

// Provider exports
pub use provider::{create_provider, Message, Provider, ProviderError};
