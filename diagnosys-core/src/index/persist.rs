//! On-disk layout of a persisted index.
//!
//! ```text
//! storage/
//!   docstore.json      passages without vectors
//!   vector_store.json  passage id -> embedding
//!   index_store.json   manifest
//! ```
//!
//! Files are written into a staging directory next to the target which is
//! then renamed into place, so an existing storage directory always holds a
//! complete set of artifacts.

use super::types::{IndexManifest, Passage};
use super::{IndexError, Result, VectorIndex, FORMAT_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const DOCSTORE_FILE: &str = "docstore.json";
const VECTOR_STORE_FILE: &str = "vector_store.json";
const INDEX_STORE_FILE: &str = "index_store.json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredPassage {
    id: String,
    doc_id: String,
    text: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DocStore {
    passages: Vec<StoredPassage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorStore {
    embedding_dict: BTreeMap<String, Vec<f32>>,
}

impl VectorIndex {
    /// Writes the index to `dir`, which must not exist yet.
    pub async fn persist(&self, dir: &Path) -> Result<()> {
        let staging = staging_dir(dir);
        let persist_err = |source| IndexError::Persist {
            path: dir.to_path_buf(),
            source,
        };

        fs::create_dir_all(&staging).await.map_err(persist_err)?;

        let written = self.write_artifacts(&staging).await;
        let renamed = match written {
            Ok(()) => fs::rename(&staging, dir).await.map_err(persist_err),
            Err(e) => Err(e),
        };

        if renamed.is_err() {
            let _ = fs::remove_dir_all(&staging).await;
        }
        renamed
    }

    async fn write_artifacts(&self, dir: &Path) -> Result<()> {
        let docstore = DocStore {
            passages: self
                .passages()
                .iter()
                .map(|p| StoredPassage {
                    id: p.id.clone(),
                    doc_id: p.doc_id.clone(),
                    text: p.text.clone(),
                    metadata: p.metadata.clone(),
                })
                .collect(),
        };
        let vectors = VectorStore {
            embedding_dict: self
                .passages()
                .iter()
                .map(|p| (p.id.clone(), p.embedding.clone()))
                .collect(),
        };

        write_json(&dir.join(DOCSTORE_FILE), &docstore).await?;
        write_json(&dir.join(VECTOR_STORE_FILE), &vectors).await?;
        write_json(&dir.join(INDEX_STORE_FILE), self.manifest()).await?;

        debug!(dir = %dir.display(), passages = self.len(), "Wrote index artifacts");
        Ok(())
    }

    /// Reconstructs an index previously written by [`persist`](Self::persist).
    pub async fn load(dir: &Path) -> Result<Self> {
        let load_err = |reason: String| IndexError::Load {
            path: dir.to_path_buf(),
            reason,
        };

        let manifest: IndexManifest = read_json(&dir.join(INDEX_STORE_FILE)).await?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(load_err(format!(
                "unsupported format version {}",
                manifest.format_version
            )));
        }

        let docstore: DocStore = read_json(&dir.join(DOCSTORE_FILE)).await?;
        let mut vectors: VectorStore = read_json(&dir.join(VECTOR_STORE_FILE)).await?;

        let mut passages = Vec::with_capacity(docstore.passages.len());
        for stored in docstore.passages {
            let embedding = vectors
                .embedding_dict
                .remove(&stored.id)
                .ok_or_else(|| load_err(format!("no vector for passage {}", stored.id)))?;

            if embedding.len() != manifest.dimension {
                return Err(load_err(format!(
                    "passage {} has dimension {}, expected {}",
                    stored.id,
                    embedding.len(),
                    manifest.dimension
                )));
            }

            passages.push(Passage {
                id: stored.id,
                doc_id: stored.doc_id,
                text: stored.text,
                embedding,
                metadata: stored.metadata,
            });
        }

        if passages.len() != manifest.passage_count {
            return Err(load_err(format!(
                "manifest lists {} passages, found {}",
                manifest.passage_count,
                passages.len()
            )));
        }

        Ok(VectorIndex::from_parts(passages, manifest))
    }
}

fn staging_dir(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "storage".to_string());
    let parent = match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    parent.join(format!(".{}.staging-{}", name, uuid::Uuid::new_v4()))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    fs::write(path, bytes).await.map_err(|source| IndexError::Persist {
        path: path.to_path_buf(),
        source,
    })
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).await.map_err(|e| IndexError::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| IndexError::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
