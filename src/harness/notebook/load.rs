//! Notebook loading and persistence
//!
//! Loading tolerates one specific corruption: several top-level JSON documents
//! concatenated in one file (a faulty append). The last plausible document is
//! recovered before the parse error is given up on.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use super::model::Notebook;

/// Errors reading or writing notebook files
#[derive(Debug, Error)]
pub enum NotebookError {
    #[error("failed to read notebook '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed notebook '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write notebook '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize notebook: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Read and parse a notebook file, applying the recovery heuristics.
pub fn load_notebook(path: &Path) -> Result<Notebook, NotebookError> {
    let text = fs::read_to_string(path).map_err(|source| NotebookError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_notebook(&text).map_err(|source| NotebookError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse notebook text.
///
/// When the whole text fails to parse, retry from (in order) the last `{`
/// before the last `"cells"` key, the last `\n{`, and the last `{`. The first
/// parse that succeeds wins; otherwise the original error is returned.
pub fn parse_notebook(text: &str) -> Result<Notebook, serde_json::Error> {
    let original = match serde_json::from_str::<Notebook>(text) {
        Ok(notebook) => return Ok(notebook),
        Err(e) => e,
    };

    for offset in recovery_offsets(text) {
        if let Ok(notebook) = serde_json::from_str::<Notebook>(text[offset..].trim_start()) {
            tracing::debug!(offset, "recovered notebook from concatenated documents");
            return Ok(notebook);
        }
    }
    Err(original)
}

/// Candidate start offsets for the last top-level document, in priority order.
fn recovery_offsets(text: &str) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(3);
    if let Some(cells) = text.rfind("\"cells\"") {
        if let Some(start) = text[..cells].rfind('{') {
            offsets.push(start);
        }
    }
    if let Some(pos) = text.rfind("\n{") {
        offsets.push(pos + 1);
    }
    if let Some(pos) = text.rfind('{') {
        offsets.push(pos);
    }
    offsets.dedup();
    offsets
}

/// Write a notebook as 1-space indented JSON, creating parent directories.
pub fn write_notebook(notebook: &Notebook, path: &Path) -> Result<(), NotebookError> {
    let write_err = |source| NotebookError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    notebook.serialize(&mut ser)?;
    buf.push(b'\n');

    fs::write(path, buf).map_err(write_err)
}

/// Where the executed copy of `source` goes inside `dir`.
pub fn executed_path(dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "notebook".to_string());
    dir.join(format!("{}.executed.ipynb", stem))
}
