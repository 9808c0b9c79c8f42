use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A chunk of a source document together with its embedding.
///
/// Passages are the unit of retrieval. `doc_id` points back to the
/// [`SourceDocument`](crate::loader::SourceDocument) the text was cut from.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub id: String,
    pub doc_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, String>,
}

impl Passage {
    pub fn new(
        id: impl Into<String>,
        doc_id: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: id.into(),
            doc_id: doc_id.into(),
            text: text.into(),
            embedding,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A search result containing a passage and its similarity score.
///
/// Returned by [`VectorIndex::search`](super::VectorIndex::search), ordered by
/// descending cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

/// Describes how a persisted index was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimension: usize,
    pub document_count: usize,
    pub passage_count: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub created_at: DateTime<Utc>,
}
