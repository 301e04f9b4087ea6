//! Validation harness for primer scripts and notebooks
//!
//! The harness is a small pipeline:
//!
//! - `discovery` - glob patterns → sorted, deduplicated candidates
//! - `script` / `notebook` - run one candidate under a wall-clock timeout
//! - `result` - per-candidate outcomes and the ordered aggregate
//! - `report` - console summary, JSON and Markdown reports
//! - `driver` - wires the stages together and picks the exit status
//!
//! ## I/O Boundaries
//!
//! Candidate execution goes through the `CandidateExecutor` trait and notebook
//! kernels through `notebook::Kernel`, so the driver and the notebook
//! classification logic can be exercised without a Python toolchain.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod config;
pub mod discovery;
pub mod driver;
pub mod notebook;
pub mod process;
pub mod report;
pub mod result;
pub mod script;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use config::{EnvDefaults, HarnessConfig};
pub use result::{ExecutionResult, FailureDetail, Outcome, RunResults};

/// Exit code recorded for a candidate killed by the wall-clock timeout.
///
/// Matches the convention of coreutils `timeout(1)`.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// What kind of file a candidate is, which decides how it gets executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CandidateKind {
    #[serde(rename = "py")]
    Python,
    #[serde(rename = "sh")]
    Shell,
    #[serde(rename = "nb")]
    Notebook,
}

impl CandidateKind {
    /// Derive the kind from a file extension (`.sh`, `.ipynb`, anything else is Python).
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("sh") => CandidateKind::Shell,
            Some("ipynb") => CandidateKind::Notebook,
            _ => CandidateKind::Python,
        }
    }

    /// Short tag used in console lines and reports.
    pub fn label(self) -> &'static str {
        match self {
            CandidateKind::Python => "py",
            CandidateKind::Shell => "sh",
            CandidateKind::Notebook => "nb",
        }
    }

    pub fn is_script(self) -> bool {
        !matches!(self, CandidateKind::Notebook)
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A discovered file eligible for execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub path: PathBuf,
    pub kind: CandidateKind,
}

impl Candidate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = CandidateKind::from_path(&path);
        Self { path, kind }
    }

    /// File name for compact display, falling back to the full path.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Execute a single candidate and always produce a result.
///
/// Implementations must not panic or bail out: timeouts, spawn failures and
/// malformed input all become an `ExecutionResult` with a failing `Outcome`.
pub trait CandidateExecutor {
    fn execute(&self, candidate: &Candidate) -> ExecutionResult;
}
