//! Reading markdown sources from disk.
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Read a document as UTF-8, falling back to lossy decoding for invalid bytes.
pub fn read_document(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
            let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
            tracing::warn!(path = %path.display(), "document is not valid UTF-8, decoding lossily");
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Err(err) => Err(Error::io(path, err)),
    }
}

/// Document identifier for a path: its basename. Chunk ids and the
/// per-source filter are keyed on this.
pub fn source_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Expand the inputs into a file list. Directories are walked for markdown
/// files (sorted); anything else, missing paths included, is passed through
/// so the caller can report it.
pub fn collect_markdown_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = walkdir::WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_markdown(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| MARKDOWN_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(ext)))
}
