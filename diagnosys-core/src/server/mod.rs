//! HTTP server for chat requests.
//!
//! The server is organized into separate concerns:
//! - `handler`: request parsing and response construction
//! - `error`: mapping of failures to `{"detail": ...}` responses
//!
//! All shared state is built once in [`Server::new`] and handed to the
//! handlers through [`AppState`].

mod error;
mod handler;

pub use error::ApiError;

use crate::chat::FormTemplate;
use crate::config::Config;
use crate::evaluation::Recorder;
use crate::index::{IndexCache, IndexError};
use crate::pipeline::AnswerPipeline;
use crate::provider::{create_provider, Provider, ProviderError};
use crate::query::QueryEngine;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnswerPipeline>,
    pub template: Arc<FormTemplate>,
}

impl AppState {
    pub fn new(pipeline: AnswerPipeline, template: FormTemplate) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            template: Arc::new(template),
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState, cors: bool) -> Router {
    let mut app = Router::new()
        .route("/api/chat", post(handler::chat))
        .route("/api/health", get(handler::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Main server: owns the index and pipeline for the process lifetime.
pub struct Server {
    config: Config,
    state: AppState,
}

impl Server {
    /// Creates the configured provider, then obtains the index.
    ///
    /// Fails with an authentication error when the provider credential is
    /// missing, and with [`IndexError::DataSourceUnavailable`] when there is
    /// no persisted index and nothing to build one from.
    pub async fn new(config: Config) -> Result<Self> {
        let provider = create_provider(&config)?;
        Self::with_provider(config, provider).await
    }

    pub async fn with_provider(config: Config, provider: Arc<dyn Provider>) -> Result<Self> {
        let cache = IndexCache::new(Arc::clone(&provider), config.rag.clone());
        let index = cache
            .obtain(&config.storage.storage_dir, &config.storage.data_dir)
            .await?;

        let engine = QueryEngine::new(index, Arc::clone(&provider), &config);
        let mut pipeline = AnswerPipeline::new(engine, &config.server);
        if config.evaluation.enabled {
            info!(
                "Evaluation enabled, recording to {}",
                config.evaluation.records_path.display()
            );
            pipeline = pipeline.with_recorder(Recorder::from_config(provider, &config));
        }

        let state = AppState::new(pipeline, FormTemplate::from_config(&config.prompt));
        Ok(Self { config, state })
    }

    pub fn router(&self) -> Router {
        router(self.state.clone(), self.config.server.cors)
    }

    /// Serves until Ctrl-C, then waits for pending evaluations.
    pub async fn start(self) -> Result<()> {
        let addr = self.config.server.bind_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("Server listening on {}", addr);
        info!("  POST /api/chat");
        info!("  GET  /api/health");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(recorder) = self.state.pipeline.recorder() {
            info!("Waiting for pending evaluations");
            recorder.flush().await;
        }
        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
