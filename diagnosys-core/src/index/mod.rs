//! Vector index over the source documents.
//!
//! # Overview
//!
//! 1. **Build**: documents are split into chunks, each chunk is embedded,
//!    and the resulting passages are kept in memory.
//! 2. **Persist / load**: the passages, their vectors and a manifest are
//!    written to the storage directory (see [`persist`]).
//! 3. **Retrieve**: a query embedding is compared against every passage by
//!    cosine similarity and the top-k passages are returned.
//!
//! The index is immutable once built. [`IndexCache`] decides whether to build
//! or load it and hands out an [`IndexHandle`] that request handlers share.

mod cache;
mod embedder;
mod persist;
mod types;

pub use cache::IndexCache;
pub use embedder::{Embedder, EmbedderError, BATCH_SIZE};
pub use types::{IndexManifest, Passage, ScoredPassage};

use crate::config::RagConfig;
use crate::loader::{chunk_text, LoaderError, SourceDocument};
use crate::provider::ProviderError;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Version written into `index_store.json`.
pub const FORMAT_VERSION: u32 = 1;

/// Shared, read-only reference to a built or loaded index.
pub type IndexHandle = Arc<VectorIndex>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Data source unavailable: no documents found in {0}")]
    DataSourceUnavailable(PathBuf),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Failed to persist index to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load index from {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ProviderError> for IndexError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Authentication(msg) => IndexError::Authentication(msg),
            other => IndexError::Provider(other),
        }
    }
}

impl From<EmbedderError> for IndexError {
    fn from(error: EmbedderError) -> Self {
        match error {
            EmbedderError::Provider(e) => e.into(),
            other => IndexError::Embedding(other.to_string()),
        }
    }
}

impl From<LoaderError> for IndexError {
    fn from(error: LoaderError) -> Self {
        match error {
            LoaderError::DataSourceUnavailable(path) => IndexError::DataSourceUnavailable(path),
            LoaderError::Io(e) => IndexError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// In-memory vector index with cosine-similarity search.
///
/// Search is a linear scan, which is adequate for document collections in
/// the low tens of thousands of passages.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    passages: Vec<Passage>,
    manifest: IndexManifest,
}

impl VectorIndex {
    pub(crate) fn from_parts(passages: Vec<Passage>, manifest: IndexManifest) -> Self {
        Self { passages, manifest }
    }

    /// Chunks and embeds `documents` into a new index.
    pub async fn from_documents(
        documents: &[SourceDocument],
        embedder: &Embedder,
        rag: &RagConfig,
    ) -> Result<Self> {
        let mut texts = Vec::new();
        let mut slots = Vec::new();

        for document in documents {
            let chunks = chunk_text(&document.text, rag.chunk_size, rag.chunk_overlap);
            for (i, chunk) in chunks.into_iter().enumerate() {
                texts.push(chunk);
                slots.push((document, i));
            }
        }

        info!("Embedding {} chunks from {} documents", texts.len(), documents.len());
        let embeddings = embedder.embed_all(&texts).await?;

        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        if embeddings.iter().any(|e| e.len() != dimension) {
            return Err(IndexError::Embedding(
                "provider returned embeddings of differing dimensions".to_string(),
            ));
        }

        let passages: Vec<Passage> = texts
            .into_iter()
            .zip(embeddings)
            .zip(slots)
            .map(|((text, embedding), (document, i))| {
                let mut passage = Passage::new(
                    format!("{}#{}", document.id, i),
                    document.id.clone(),
                    text,
                    embedding,
                );
                passage.metadata = document.metadata.clone();
                passage.with_metadata("chunk", i.to_string())
            })
            .collect();

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            embedding_model: embedder.model().to_string(),
            dimension,
            document_count: documents.len(),
            passage_count: passages.len(),
            chunk_size: rag.chunk_size,
            chunk_overlap: rag.chunk_overlap,
            created_at: Utc::now(),
        };

        Ok(Self { passages, manifest })
    }

    /// Returns the `top_k` passages most similar to `query_embedding`.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Vec<ScoredPassage> {
        let mut results: Vec<ScoredPassage> = self
            .passages
            .iter()
            .map(|passage| ScoredPassage {
                score: cosine_similarity(query_embedding, &passage.embedding),
                passage: passage.clone(),
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        results
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;
    use std::collections::HashMap;

    fn document(id: &str, text: &str) -> SourceDocument {
        SourceDocument {
            id: id.to_string(),
            text: text.to_string(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_from_documents_and_search() {
        let embedder = Embedder::new(Arc::new(MockProvider::new()));
        let docs = vec![
            document("letters.md", "Dimensional standards for letters and postcards"),
            document("asthma.md", "Acute asthma management with inhaled bronchodilators"),
        ];

        let index = VectorIndex::from_documents(&docs, &embedder, &RagConfig::default())
            .await
            .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.manifest().document_count, 2);
        assert_eq!(index.manifest().embedding_model, "mock-embedding");
        assert_eq!(index.passages()[0].id, "letters.md#0");
        assert_eq!(index.passages()[0].metadata["chunk"], "0");

        let query = embedder.embed("What are dimensional standards for letters?").await.unwrap();
        let results = index.search(&query, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].passage.doc_id, "letters.md");
    }

    #[tokio::test]
    async fn test_long_documents_are_chunked() {
        let embedder = Embedder::new(Arc::new(MockProvider::new()));
        let rag = RagConfig {
            chunk_size: 16,
            chunk_overlap: 4,
            ..RagConfig::default()
        };
        let docs = vec![document("long.md", &"word ".repeat(20))];

        let index = VectorIndex::from_documents(&docs, &embedder, &rag).await.unwrap();

        assert!(index.len() > 1);
        assert!(index.passages().iter().all(|p| p.doc_id == "long.md"));
    }

    #[tokio::test]
    async fn test_authentication_error_is_preserved() {
        let error: IndexError = EmbedderError::Provider(ProviderError::Authentication("no key".into())).into();
        assert!(matches!(error, IndexError::Authentication(msg) if msg == "no key"));
    }
}
