//! Integration tests for notebook execution with an in-process kernel

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use primer_check::harness::notebook::{
    CellError, Kernel, KernelError, KernelRequest, KernelRun, Notebook, NotebookExecutor, Output, load_notebook,
};
use primer_check::{Candidate, CandidateExecutor, HarnessConfig, Outcome};
use serde_json::json;
use tempfile::TempDir;

/// What the fake kernel does with every notebook it is given
#[derive(Debug, Clone)]
enum Behavior {
    Pass,
    /// Record a `ValueError` on this cell, like a kernel run with errors allowed
    RaiseAt(usize),
    /// Report the first unexpected recorded error, like `JupyterKernel`
    Replay,
    Hang,
    Crash,
}

struct FakeKernel {
    behavior: Behavior,
    seen: Mutex<Vec<Notebook>>,
}

impl FakeKernel {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl Kernel for FakeKernel {
    async fn execute(&self, request: KernelRequest<'_>) -> Result<KernelRun, KernelError> {
        self.seen.lock().unwrap().push(request.notebook.clone());

        let mut notebook = request.notebook.clone();
        match self.behavior {
            Behavior::Pass => Ok(KernelRun { notebook, error: None }),
            Behavior::RaiseAt(index) => {
                let error: Output = serde_json::from_value(json!({
                    "output_type": "error",
                    "ename": "ValueError",
                    "evalue": "negative radius",
                    "traceback": ["Traceback (most recent call last)", "ValueError: negative radius"]
                }))
                .unwrap();
                notebook.cells[index].outputs = Some(vec![error]);
                Ok(KernelRun {
                    notebook,
                    error: Some(CellError::at(index)),
                })
            }
            Behavior::Replay => {
                let error = notebook.first_error_cell().map(CellError::at);
                Ok(KernelRun { notebook, error })
            }
            Behavior::Hang => Err(KernelError::Timeout(request.timeout)),
            Behavior::Crash => Err(KernelError::Infrastructure("kernel died".to_string())),
        }
    }
}

fn notebook_json() -> serde_json::Value {
    json!({
        "cells": [
            {"cell_type": "markdown", "metadata": {}, "source": "# Geometry"},
            {"cell_type": "code", "metadata": {}, "source": ["r = -1\n", "area(r)"]}
        ],
        "metadata": {"kernelspec": {"name": "python3"}},
        "nbformat": 4,
        "nbformat_minor": 2
    })
}

struct Fixture {
    dir: TempDir,
    notebook: PathBuf,
}

impl Fixture {
    fn new(contents: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("notebooks")).unwrap();
        let notebook = dir.path().join("notebooks/07_geometry.ipynb");
        fs::write(&notebook, contents).unwrap();
        Self { dir, notebook }
    }

    fn executed_dir(&self) -> PathBuf {
        self.dir.path().join("executed")
    }

    fn config(&self) -> HarnessConfig {
        HarnessConfig::notebooks()
            .with_executed_dir(self.executed_dir())
            .with_timeout(Duration::from_secs(5))
            .with_quiet(true)
    }

    fn run(&self, kernel: FakeKernel) -> (primer_check::ExecutionResult, FakeKernel) {
        let executor = NotebookExecutor::with_kernel(kernel, &self.config());
        let result = executor.execute(&Candidate::new(&self.notebook));
        (result, executor.kernel)
    }
}

fn executed_copy(dir: &Path) -> Notebook {
    load_notebook(&dir.join("07_geometry.executed.ipynb")).unwrap()
}

#[test]
fn test_clean_notebook_passes_and_is_persisted() {
    let fixture = Fixture::new(&notebook_json().to_string());
    let (result, kernel) = fixture.run(FakeKernel::new(Behavior::Pass));

    assert_eq!(result.outcome, Outcome::Passed);
    assert!(result.ok());

    // The kernel received a normalized notebook
    let seen = kernel.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].nbformat_minor, 5);
    assert!(seen[0].cells.iter().all(|c| c.id.is_some()));
    assert!(seen[0].cells[1].outputs.is_some());

    let copy = executed_copy(&fixture.executed_dir());
    assert_eq!(copy.cells.len(), 2);
}

#[test]
fn test_error_in_second_step_is_classified() {
    let fixture = Fixture::new(&notebook_json().to_string());
    let (result, _) = fixture.run(FakeKernel::new(Behavior::RaiseAt(1)));

    assert!(!result.ok());
    assert_eq!(result.exit_code(), 1);
    let detail = result.outcome.failure().unwrap();
    assert_eq!(detail.notebook, "07_geometry.ipynb");
    assert_eq!(detail.cell_index, 1);
    assert_eq!(detail.ename, "ValueError");
    assert_eq!(detail.evalue, "negative radius");
    assert_eq!(detail.traceback.len(), 2);
    assert!(detail.snippet.contains("area(r)"));

    // The executed copy keeps the recorded error output
    let copy = executed_copy(&fixture.executed_dir());
    assert_eq!(copy.first_error_cell(), Some(1));
}

#[test]
fn test_last_of_concatenated_documents_is_recovered() {
    // An older, truncated copy precedes the current document
    let stale = json!({
        "cells": [{"cell_type": "code", "metadata": {}, "source": "stale = True"}],
        "metadata": {},
        "nbformat": 4,
        "nbformat_minor": 4
    })
    .to_string();
    let truncated = &stale[..stale.len() - 1];
    let contents = format!("{}\n{}", truncated, notebook_json());
    let fixture = Fixture::new(&contents);
    let (result, kernel) = fixture.run(FakeKernel::new(Behavior::Pass));

    assert_eq!(result.outcome, Outcome::Passed);
    let seen = kernel.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].cells.len(), 2);
    assert_eq!(seen[0].cells[1].snippet(20), "r = -1\narea(r)");
    assert!(seen[0].metadata.contains_key("kernelspec"));

    let copy = executed_copy(&fixture.executed_dir());
    assert!(copy.cells.iter().all(|c| !c.source.text().contains("stale")));
}

#[test]
fn test_timeout_has_no_step_detail() {
    let fixture = Fixture::new(&notebook_json().to_string());
    let (result, _) = fixture.run(FakeKernel::new(Behavior::Hang));

    assert_eq!(result.outcome, Outcome::TimedOut);
    assert!(result.outcome.failure().is_none());
    // Persisted even though execution never finished
    assert!(fixture.executed_dir().join("07_geometry.executed.ipynb").is_file());
}

#[test]
fn test_kernel_crash_is_infrastructure_failure() {
    let fixture = Fixture::new(&notebook_json().to_string());
    let (result, _) = fixture.run(FakeKernel::new(Behavior::Crash));

    match &result.outcome {
        Outcome::Infrastructure(message) => assert!(message.contains("kernel died")),
        other => panic!("expected infrastructure failure, got {:?}", other),
    }
}

#[test]
fn test_malformed_notebook_fails_without_reaching_kernel() {
    let fixture = Fixture::new("this is not json at all");
    let (result, kernel) = fixture.run(FakeKernel::new(Behavior::Pass));

    assert!(matches!(result.outcome, Outcome::Infrastructure(_)));
    assert!(kernel.seen.lock().unwrap().is_empty());
    assert!(!fixture.executed_dir().exists());
}

#[test]
fn test_write_normalized_updates_source_file() {
    let fixture = Fixture::new(&notebook_json().to_string());
    let config = fixture.config().with_write_normalized(true);
    let executor = NotebookExecutor::with_kernel(FakeKernel::new(Behavior::Pass), &config);
    executor.execute(&Candidate::new(&fixture.notebook));

    let source = load_notebook(&fixture.notebook).unwrap();
    assert_eq!(source.nbformat_minor, 5);
    assert!(source.cells.iter().all(|c| c.id.is_some()));
}

fn notebook_with_recorded_error(tags: serde_json::Value) -> String {
    json!({
        "cells": [
            {"cell_type": "markdown", "metadata": {}, "source": "Dividing by zero raises:"},
            {"cell_type": "code", "metadata": {"tags": tags}, "source": "1 / 0",
             "outputs": [{"output_type": "error", "ename": "ZeroDivisionError", "evalue": "division by zero",
                          "traceback": ["ZeroDivisionError: division by zero"]}]}
        ],
        "metadata": {},
        "nbformat": 4,
        "nbformat_minor": 5
    })
    .to_string()
}

#[test]
fn test_expected_exception_cell_passes() {
    let fixture = Fixture::new(&notebook_with_recorded_error(json!(["raises-exception"])));
    let (result, _) = fixture.run(FakeKernel::new(Behavior::Replay));
    assert_eq!(result.outcome, Outcome::Passed);
}

#[test]
fn test_untagged_exception_cell_fails() {
    let fixture = Fixture::new(&notebook_with_recorded_error(json!([])));
    let (result, _) = fixture.run(FakeKernel::new(Behavior::Replay));

    let detail = result.outcome.failure().unwrap();
    assert_eq!(detail.cell_index, 1);
    assert_eq!(detail.ename, "ZeroDivisionError");
}
