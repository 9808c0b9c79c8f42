//! diagnosys - Retrieval-augmented clinical question answering
//!
//! This is the convenience wrapper crate that re-exports the
//! `diagnosys-core` components.
//!
//! # Quick Start
//!
//! ```no_run
//! use diagnosys::prelude::*;
//!
//! # async fn run() -> Result<(), ServerError> {
//! let config = Config::load_or_default();
//! Server::new(config).await?.start().await
//! # }
//! ```

// Re-export core
pub use diagnosys_core::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use diagnosys_core::chat::{ChatTurn, FormTemplate, Role};
    pub use diagnosys_core::config::{Config, ResponseMode};
    pub use diagnosys_core::provider::{MockProvider, Provider};
    pub use diagnosys_core::{
        AnswerPipeline, IndexCache, NormalizedChat, QueryEngine, Server, ServerError,
    };
}
