//! Candidate discovery
//!
//! Resolves include/exclude glob patterns against the filesystem. The result
//! is a pure function of the filesystem state at call time: regular files only,
//! no duplicates, sorted by path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::Candidate;

/// Errors that occur during discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Resolve `includes` (or `default_pattern` when empty) minus `excludes`.
///
/// Patterns are interpreted relative to `root` unless they are absolute.
#[tracing::instrument(skip_all, fields(root = %root.display(), includes = includes.len(), excludes = excludes.len()))]
pub fn discover(
    root: &Path,
    includes: &[String],
    excludes: &[String],
    default_pattern: &str,
) -> Result<Vec<Candidate>, DiscoveryError> {
    let fallback = [default_pattern.to_string()];
    let includes = if includes.is_empty() { &fallback[..] } else { includes };

    let mut seen = HashSet::new();
    let mut paths = Vec::new();
    for pattern in includes {
        for path in expand(root, pattern)? {
            if !path.is_file() {
                continue;
            }
            if seen.insert(identity(&path)) {
                paths.push(path);
            }
        }
    }

    let mut excluded = HashSet::new();
    for pattern in excludes {
        for path in expand(root, pattern)? {
            excluded.insert(identity(&path));
        }
    }

    paths.retain(|p| !excluded.contains(&identity(p)));
    paths.sort();

    tracing::debug!(count = paths.len(), "discovery complete");
    Ok(paths.into_iter().map(Candidate::new).collect())
}

/// Expand one glob pattern into the paths it matches (unsorted).
fn expand(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    let full = if Path::new(pattern).is_absolute() {
        PathBuf::from(pattern)
    } else {
        root.join(pattern)
    };
    let full = full.to_string_lossy().into_owned();

    let entries = glob::glob(&full).map_err(|source| DiscoveryError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => paths.push(strip_dot(path)),
            Err(e) => tracing::debug!(error = %e, "skipping unreadable glob entry"),
        }
    }
    Ok(paths)
}

/// Canonical identity used for dedup and exclusion.
fn identity(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Drop a leading `./` so console output matches what users typed.
fn strip_dot(path: PathBuf) -> PathBuf {
    match path.strip_prefix(".") {
        Ok(stripped) if !stripped.as_os_str().is_empty() => stripped.to_path_buf(),
        _ => path,
    }
}
