//! Build-or-load decision for the persisted index.

use super::{Embedder, IndexHandle, Result, VectorIndex};
use crate::config::RagConfig;
use crate::loader::load_documents;
use crate::provider::Provider;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

/// Owns the persist/load boundary of the index.
///
/// The existence of the storage directory is the only cache signal: once it
/// has been written it is never rebuilt, even if the source documents
/// change. Delete the directory to force a rebuild.
///
/// The existence check and the build are not atomic. Call
/// [`obtain`](Self::obtain) once during startup and share the returned handle;
/// never call it per request.
pub struct IndexCache {
    provider: Arc<dyn Provider>,
    rag: RagConfig,
}

impl IndexCache {
    pub fn new(provider: Arc<dyn Provider>, rag: RagConfig) -> Self {
        Self { provider, rag }
    }

    /// Returns the index stored at `storage_dir`, building it from
    /// `data_dir` first if nothing has been persisted yet.
    ///
    /// # Errors
    ///
    /// - [`IndexError::DataSourceUnavailable`](super::IndexError::DataSourceUnavailable)
    ///   when a build is needed and `data_dir` holds no documents
    /// - [`IndexError::Authentication`](super::IndexError::Authentication)
    ///   when the provider rejects the credential during embedding
    /// - [`IndexError::Load`](super::IndexError::Load) when persisted artifacts are corrupt
    pub async fn obtain(&self, storage_dir: &Path, data_dir: &Path) -> Result<IndexHandle> {
        let exists = fs::try_exists(storage_dir).await?;

        if !exists {
            info!("Creating new index");
            let documents = load_documents(data_dir, &self.rag.indexer).await?;
            let embedder = Embedder::new(Arc::clone(&self.provider));
            let index = VectorIndex::from_documents(&documents, &embedder, &self.rag).await?;
            index.persist(storage_dir).await?;
            info!(
                documents = documents.len(),
                passages = index.len(),
                "Finished creating new index. Stored in {}",
                storage_dir.display()
            );
            return Ok(Arc::new(index));
        }

        info!("Loading index from {}...", storage_dir.display());
        let index = VectorIndex::load(storage_dir).await?;

        let stored_model = &index.manifest().embedding_model;
        if stored_model != self.provider.embedding_model() {
            warn!(
                stored = %stored_model,
                configured = %self.provider.embedding_model(),
                "Persisted index was built with a different embedding model; delete {} to rebuild",
                storage_dir.display()
            );
        }

        info!(passages = index.len(), "Finished loading index from {}", storage_dir.display());
        Ok(Arc::new(index))
    }
}
