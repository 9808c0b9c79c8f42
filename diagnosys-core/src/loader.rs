//! Source document loading and text chunking.
//!
//! This module provides functionality to:
//! - Recursively collect documents from the content directory
//! - Filter files by extension and exclude patterns
//! - Split large text into overlapping chunks

use crate::config::IndexerConfig;
use crate::patterns::should_exclude;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Errors that can occur while loading source documents.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// An I/O error occurred while walking the directory tree.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The content directory is missing or holds no usable documents.
    #[error("No source documents available in {0}")]
    DataSourceUnavailable(PathBuf),
}

/// Result type for loading operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// A normalized document read from the content directory.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Path relative to the content directory, using `/` separators.
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

/// Loads every indexable document below `data_dir`.
///
/// Unreadable or non-UTF-8 files are skipped with a warning, as are files
/// whose content is blank. Documents are returned sorted by id so that
/// builds over the same directory are deterministic.
///
/// # Errors
///
/// [`LoaderError::DataSourceUnavailable`] if `data_dir` does not exist, is not
/// a directory, or yields no documents.
pub async fn load_documents(data_dir: &Path, config: &IndexerConfig) -> Result<Vec<SourceDocument>> {
    let is_dir = fs::metadata(data_dir)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(LoaderError::DataSourceUnavailable(data_dir.to_path_buf()));
    }

    let mut documents = Vec::new();
    collect_recursive(data_dir, data_dir, &mut documents, config).await?;

    if documents.is_empty() {
        return Err(LoaderError::DataSourceUnavailable(data_dir.to_path_buf()));
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(documents)
}

fn collect_recursive<'a>(
    root: &'a Path,
    dir: &'a Path,
    documents: &'a mut Vec<SourceDocument>,
    config: &'a IndexerConfig,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

            if should_exclude(&relative, &config.exclude_patterns) {
                debug!(path = %relative.display(), "Excluded from loading");
                continue;
            }

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                collect_recursive(root, &path, documents, config).await?;
            } else if is_indexable(&path, &config.extensions) {
                match fs::read_to_string(&path).await {
                    Ok(text) if text.trim().is_empty() => {
                        warn!(path = %path.display(), "Skipping empty document");
                    }
                    Ok(text) => documents.push(source_document(&path, &relative, text)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                    }
                }
            }
        }

        Ok(())
    })
}

fn source_document(path: &Path, relative: &Path, text: String) -> SourceDocument {
    let id = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let mut metadata = HashMap::new();
    if let Some(name) = path.file_name() {
        metadata.insert("file_name".to_string(), name.to_string_lossy().to_string());
    }
    metadata.insert("file_path".to_string(), path.to_string_lossy().to_string());

    SourceDocument { id, text, metadata }
}

/// Checks if a file should be loaded based on its extension.
///
/// If `extensions` is empty, all files are considered indexable.
fn is_indexable(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }

    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Splits text into overlapping chunks for better context preservation.
///
/// Sizes are in bytes. Chunk boundaries are moved to the nearest UTF-8
/// character boundary so multi-byte characters are never split.
pub(crate) fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }

    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + chunk_size).min(text.len());

        // Find the nearest character boundary at or before 'end'
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // chunk_size is smaller than the character at `start`
            end = start + 1;
            while end < text.len() && !text.is_char_boundary(end) {
                end += 1;
            }
        }

        chunks.push(text[start..end].to_string());

        if end == text.len() {
            break;
        }

        // Next chunk starts `overlap` bytes before this one ended, always moving forward
        let mut next = end.saturating_sub(overlap);
        if next <= start {
            next = end;
        }
        while next < end && !text.is_char_boundary(next) {
            next += 1;
        }
        start = next;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_small() {
        let chunks = chunk_text("Hello", 10, 2);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn test_chunk_text_with_overlap() {
        let chunks = chunk_text("0123456789ABCDEF", 10, 2);
        assert_eq!(chunks, vec!["0123456789", "89ABCDEF"]);
    }

    #[test]
    fn test_chunk_text_respects_char_boundaries() {
        let text = "ééééé";
        let chunks = chunk_text(text, 3, 0);
        assert!(chunks.iter().all(|c| !c.is_empty()));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_is_indexable() {
        let extensions = vec!["md".to_string(), "txt".to_string()];
        assert!(is_indexable(Path::new("letters.md"), &extensions));
        assert!(is_indexable(Path::new("NOTES.TXT"), &extensions));
        assert!(!is_indexable(Path::new("build.sh"), &extensions));
        assert!(!is_indexable(Path::new("README"), &extensions));
        assert!(is_indexable(Path::new("README"), &[]));
    }

    #[tokio::test]
    async fn test_load_documents_walks_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("postal/.git")).unwrap();
        std::fs::write(dir.path().join("postal/letters.md"), "Dimensional Standards for Letters").unwrap();
        std::fs::write(dir.path().join("postal/.git/HEAD"), "ref: main").unwrap();
        std::fs::write(dir.path().join("a.md"), "Alpha").unwrap();
        std::fs::write(dir.path().join("blank.md"), "   \n").unwrap();

        let docs = load_documents(dir.path(), &IndexerConfig::default()).await.unwrap();

        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a.md", "postal/letters.md"]);
        assert_eq!(docs[1].metadata["file_name"], "letters.md");
    }

    #[tokio::test]
    async fn test_missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("md");
        let result = load_documents(&missing, &IndexerConfig::default()).await;
        assert!(matches!(result, Err(LoaderError::DataSourceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_empty_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_documents(dir.path(), &IndexerConfig::default()).await;
        assert!(matches!(result, Err(LoaderError::DataSourceUnavailable(_))));
    }
}
