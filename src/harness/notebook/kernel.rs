//! Notebook kernel boundary
//!
//! The harness never executes notebook code itself. A `Kernel` takes a
//! normalized notebook and hands back the executed copy plus, if a step
//! raised, where it raised. `JupyterKernel` is the default and pipes the
//! notebook through `jupyter nbconvert --execute`.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use super::model::Notebook;
use crate::harness::process::{self, LaunchSpec, ProcessStatus};

/// Characters of kernel stderr kept in infrastructure errors.
const STDERR_TAIL: usize = 2_000;
/// Kernel startup and shutdown allowance on top of the per-cell budget.
pub const KERNEL_STARTUP_MARGIN: Duration = Duration::from_secs(60);

/// Wall-clock limit for a whole notebook run.
///
/// The requested timeout bounds each cell, so the process as a whole gets
/// one cell budget per code cell (at least one) plus the startup margin.
pub fn wall_clock_limit(cell_timeout: Duration, notebook: &Notebook) -> Duration {
    let code_cells = notebook.cells.iter().filter(|c| c.is_code()).count().max(1);
    let code_cells = u32::try_from(code_cells).unwrap_or(u32::MAX);
    cell_timeout
        .saturating_mul(code_cells)
        .saturating_add(KERNEL_STARTUP_MARGIN)
}

/// Errors where no step-level detail is available
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("notebook execution timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("kernel failed: {0}")]
    Infrastructure(String),
}

/// A step that raised during execution.
///
/// Kernels that know the exception details fill them in; kernels that only
/// know the cell index leave them empty and the error output recorded on
/// that cell is used instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellError {
    pub cell_index: usize,
    pub ename: Option<String>,
    pub evalue: Option<String>,
    pub traceback: Vec<String>,
}

impl CellError {
    pub fn at(cell_index: usize) -> Self {
        Self {
            cell_index,
            ..Self::default()
        }
    }
}

/// What a kernel hands back after running a notebook
#[derive(Debug, Clone)]
pub struct KernelRun {
    /// The notebook with outputs populated (possibly partially)
    pub notebook: Notebook,
    pub error: Option<CellError>,
}

/// Parameters of one kernel execution
#[derive(Debug, Clone)]
pub struct KernelRequest<'a> {
    pub notebook: &'a Notebook,
    pub kernel_name: &'a str,
    /// Limit for each cell
    pub timeout: Duration,
    /// Added to the kernel's inherited environment
    pub env: Vec<(String, String)>,
}

/// Executes every cell of a notebook, sequentially, each within the request timeout.
pub trait Kernel {
    fn execute(&self, request: KernelRequest<'_>) -> impl Future<Output = Result<KernelRun, KernelError>> + Send;
}

/// Runs notebooks through `jupyter nbconvert`.
#[derive(Debug, Clone)]
pub struct JupyterKernel {
    /// Launcher program, normally `jupyter`
    pub program: String,
}

impl JupyterKernel {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn launch_spec(&self, request: &KernelRequest<'_>, payload: Vec<u8>) -> LaunchSpec {
        LaunchSpec::new(self.program.clone())
            .args([
                "nbconvert",
                "--to",
                "notebook",
                "--execute",
                "--stdin",
                "--stdout",
                "--allow-errors",
            ])
            .arg(format!("--ExecutePreprocessor.kernel_name={}", request.kernel_name))
            .arg(format!("--ExecutePreprocessor.timeout={}", request.timeout.as_secs().max(1)))
            .envs(request.env.clone())
            .stdin(payload)
    }
}

impl Default for JupyterKernel {
    fn default() -> Self {
        Self::new("jupyter")
    }
}

impl Kernel for JupyterKernel {
    async fn execute(&self, request: KernelRequest<'_>) -> Result<KernelRun, KernelError> {
        let payload = serde_json::to_vec(request.notebook)
            .map_err(|e| KernelError::Infrastructure(format!("cannot serialize notebook: {}", e)))?;
        let spec = self.launch_spec(&request, payload);
        let limit = wall_clock_limit(request.timeout, request.notebook);

        let out = process::run(&spec, limit)
            .await
            .map_err(|e| KernelError::Infrastructure(e.to_string()))?;

        match out.status {
            ProcessStatus::TimedOut => Err(KernelError::Timeout(limit)),
            ProcessStatus::Exited(0) => {
                let notebook: Notebook = serde_json::from_str(&out.output.stdout).map_err(|e| {
                    KernelError::Infrastructure(format!("kernel returned an unreadable notebook: {}", e))
                })?;
                // With --allow-errors every cell runs; the first recorded error is the failure.
                let error = notebook.first_error_cell().map(CellError::at);
                Ok(KernelRun { notebook, error })
            }
            ProcessStatus::Exited(code) => {
                let stderr = out.output.stderr.trim();
                if stderr.contains("CellTimeoutError") {
                    return Err(KernelError::Timeout(request.timeout));
                }
                Err(KernelError::Infrastructure(format!(
                    "{} exited with code {}: {}",
                    self.program,
                    code,
                    process::tail(stderr, STDERR_TAIL)
                )))
            }
        }
    }
}
