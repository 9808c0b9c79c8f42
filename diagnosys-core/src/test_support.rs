//! Fixtures shared by the unit tests.

use crate::config::RagConfig;
use crate::index::{Embedder, IndexHandle, VectorIndex};
use crate::loader::SourceDocument;
use crate::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;

pub fn sample_documents() -> Vec<SourceDocument> {
    let doc = |id: &str, text: &str| SourceDocument {
        id: id.to_string(),
        text: text.to_string(),
        metadata: HashMap::from([("file_name".to_string(), id.to_string())]),
    };
    vec![
        doc(
            "letters.md",
            "Dimensional Standards for Letters: letters must be rectangular and at least 5 inches long.",
        ),
        doc("asthma.md", "Acute asthma is treated with salbutamol and oxygen."),
    ]
}

pub async fn sample_index(provider: Arc<dyn Provider>) -> IndexHandle {
    let index = VectorIndex::from_documents(&sample_documents(), &Embedder::new(provider), &RagConfig::default())
        .await
        .unwrap();
    Arc::new(index)
}
