//! Notebook executor
//!
//! Steps per notebook, in order:
//!
//! 1. load (with recovery for concatenated documents)
//! 2. normalize cell ids and cell shapes
//! 3. execute every cell through a `Kernel`
//! 4. classify the outcome
//! 5. persist the executed copy, whatever the outcome
//!
//! Only a load failure skips execution; everything after loading is
//! best-effort and never aborts the run.

pub mod kernel;
pub mod load;
pub mod model;
pub mod normalize;

use std::path::PathBuf;
use std::time::{Duration, Instant};

pub use kernel::{CellError, JupyterKernel, Kernel, KernelError, KernelRequest, KernelRun};
pub use load::{NotebookError, executed_path, load_notebook, parse_notebook, write_notebook};
pub use model::{Cell, Notebook, Output, Source};
pub use normalize::normalize;

use super::config::{EnvDefaults, HarnessConfig};
use super::{Candidate, CandidateExecutor, CandidateKind, ExecutionResult, FailureDetail, Outcome};
use crate::runtime;

/// Source lines of the failing cell kept for diagnostics.
pub const SNIPPET_LINES: usize = 20;

/// Executes notebook candidates through a kernel.
#[derive(Debug, Clone)]
pub struct NotebookExecutor<K> {
    pub kernel: K,
    pub kernel_name: String,
    pub timeout: Duration,
    /// Directory receiving `<stem>.executed.ipynb` copies
    pub executed_dir: PathBuf,
    pub env_defaults: EnvDefaults,
    /// Write the normalized notebook back over its source file
    pub write_normalized: bool,
    pub echo: bool,
}

impl NotebookExecutor<JupyterKernel> {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::with_kernel(JupyterKernel::new(config.jupyter.clone()), config)
    }
}

impl<K: Kernel + Sync> NotebookExecutor<K> {
    pub fn with_kernel(kernel: K, config: &HarnessConfig) -> Self {
        Self {
            kernel,
            kernel_name: config.kernel.clone(),
            timeout: config.timeout,
            executed_dir: config.executed_dir.clone(),
            env_defaults: config.env_defaults.clone(),
            write_normalized: config.write_normalized,
            echo: !config.quiet,
        }
    }

    async fn run(&self, candidate: &Candidate) -> ExecutionResult {
        let start = Instant::now();
        if self.echo {
            println!("[nb] executing {} ...", candidate.path.display());
        }

        let mut notebook = match load_notebook(&candidate.path) {
            Ok(notebook) => notebook,
            Err(e) => {
                tracing::warn!(error = %e, "notebook could not be loaded");
                return ExecutionResult::new(candidate.clone(), Outcome::Infrastructure(e.to_string()), start.elapsed());
            }
        };

        if normalize(&mut notebook) && self.write_normalized {
            if let Err(e) = write_notebook(&notebook, &candidate.path) {
                tracing::warn!(error = %e, "could not write normalized notebook back");
            }
        }

        let request = KernelRequest {
            notebook: &notebook,
            kernel_name: &self.kernel_name,
            timeout: self.timeout,
            env: self.env_defaults.resolve_for(CandidateKind::Notebook),
        };
        let run = self.kernel.execute(request).await;

        let (executed, outcome) = match run {
            Ok(run) => {
                let outcome = classify(&candidate.name(), &run);
                (run.notebook, outcome)
            }
            Err(KernelError::Timeout(_)) => (notebook, Outcome::TimedOut),
            Err(e @ KernelError::Infrastructure(_)) => (notebook, Outcome::Infrastructure(e.to_string())),
        };

        let out_path = executed_path(&self.executed_dir, &candidate.path);
        if let Err(e) = write_notebook(&executed, &out_path) {
            tracing::warn!(error = %e, "could not save executed notebook");
        }

        ExecutionResult::new(candidate.clone(), outcome, start.elapsed())
    }
}

impl<K: Kernel + Sync> CandidateExecutor for NotebookExecutor<K> {
    #[tracing::instrument(skip_all, fields(path = %candidate.path.display(), kernel = %self.kernel_name))]
    fn execute(&self, candidate: &Candidate) -> ExecutionResult {
        match runtime::block_on(self.run(candidate)) {
            Ok(result) => result,
            Err(e) => ExecutionResult::new(
                candidate.clone(),
                Outcome::Infrastructure(format!("runtime unavailable: {}", e)),
                Duration::ZERO,
            ),
        }
    }
}

/// Turn a kernel run into an outcome.
///
/// Error details reported by the kernel are the baseline; the failing cell's
/// recorded `error` output overrides them when present.
pub fn classify(notebook_name: &str, run: &KernelRun) -> Outcome {
    let Some(error) = &run.error else {
        return Outcome::Passed;
    };

    let mut ename = error.ename.clone().unwrap_or_else(|| "ExecutionError".to_string());
    let mut evalue = error.evalue.clone().unwrap_or_default();
    let mut traceback = error.traceback.clone();
    let mut snippet = String::new();

    if let Some(cell) = run.notebook.cells.get(error.cell_index) {
        snippet = cell.snippet(SNIPPET_LINES);
        if let Some(recorded) = cell.error_output() {
            ename = recorded.ename.unwrap_or(ename);
            evalue = recorded.evalue.unwrap_or(evalue);
            if !recorded.traceback.is_empty() {
                traceback = recorded.traceback;
            }
        }
    }

    Outcome::StepError(FailureDetail {
        notebook: notebook_name.to_string(),
        cell_index: error.cell_index,
        ename,
        evalue,
        traceback,
        snippet,
    })
}
