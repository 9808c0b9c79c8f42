//! Common file patterns used when loading source documents.

/// Default patterns to exclude from document loading.
pub fn default_exclude_patterns() -> Vec<String> {
    vec![
        // Version control
        ".git".to_string(),
        ".svn".to_string(),
        ".hg".to_string(),

        // Editors
        ".vscode".to_string(),
        ".idea".to_string(),
        ".obsidian".to_string(),

        // OS
        ".DS_Store".to_string(),
        "Thumbs.db".to_string(),

        // Temp/cache
        ".cache".to_string(),
        "__pycache__".to_string(),
    ]
}

/// Binary file extensions that should be skipped.
pub fn binary_extensions() -> &'static [&'static str] {
    &[
        // Images
        "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp",
        // Office formats (no text extractor)
        "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
        // Archives
        "zip", "tar", "gz", "bz2", "7z", "rar",
        // Media
        "mp3", "mp4", "avi", "mov", "mkv", "wav", "flac",
        // Binary data
        "bin", "dat", "db", "sqlite", "sqlite3",
    ]
}

/// Check if a path should be skipped based on exclude patterns.
///
/// A path is skipped if any of its components contains a pattern, or if its
/// extension is a known binary format.
pub fn should_exclude(path: &std::path::Path, exclude_patterns: &[String]) -> bool {
    let excluded = path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .map(|name| exclude_patterns.iter().any(|pattern| name.contains(pattern.as_str())))
            .unwrap_or(false)
    });
    if excluded {
        return true;
    }

    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        if binary_extensions().contains(&ext.as_str()) {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_should_exclude_git() {
        let path = PathBuf::from("md/.git/config");
        let patterns = default_exclude_patterns();
        assert!(should_exclude(&path, &patterns));
    }

    #[test]
    fn test_should_not_exclude_markdown() {
        let path = PathBuf::from("md/cardiology/chest-pain.md");
        let patterns = default_exclude_patterns();
        assert!(!should_exclude(&path, &patterns));
    }

    #[test]
    fn test_should_exclude_binary() {
        let path = PathBuf::from("md/figures/ecg.PNG");
        let patterns = default_exclude_patterns();
        assert!(should_exclude(&path, &patterns));
    }
}
