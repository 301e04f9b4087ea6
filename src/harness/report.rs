//! Result reporting
//!
//! ## Reporter Trait
//!
//! The driver calls a `Reporter` at each stage of a run, keeping console
//! output separate from execution. `ConsoleReporter` is the default.
//!
//! ## Report Documents
//!
//! After the run the ordered results can be written as a JSON array of flat
//! `ReportRecord`s and/or as a Markdown document.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::process;
use super::result::{ExecutionResult, FailureDetail, Outcome, RunResults};
use super::{Candidate, CandidateKind};

/// Traceback lines shown per failure.
pub const TRACEBACK_LINES: usize = 20;
/// Characters of captured output kept per JSON record.
pub const REPORT_OUTPUT_LIMIT: usize = 5_000;

/// Errors writing report documents
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report '{}': {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Reporter Trait
// ============================================================================

/// Trait for reporting run progress and results.
pub trait Reporter {
    /// Called once discovery has produced the candidate list
    fn on_collection_complete(&mut self, _count: usize) {}

    /// Called before a candidate runs
    fn on_candidate_start(&mut self, _candidate: &Candidate) {}

    /// Called after a candidate finished
    fn on_candidate_complete(&mut self, _result: &ExecutionResult) {}

    /// Called when all candidates have completed
    fn on_run_complete(&mut self, results: &RunResults);
}

/// Default console reporter
pub struct ConsoleReporter<W: Write> {
    out: W,
    noun: String,
    color: bool,
}

impl ConsoleReporter<io::Stdout> {
    /// Reporter on stdout, colored when stdout is a terminal.
    pub fn stdout(noun: impl Into<String>) -> Self {
        use std::io::IsTerminal;
        let color = io::stdout().is_terminal();
        Self::new(io::stdout(), noun).with_color(color)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, noun: impl Into<String>) -> Self {
        Self {
            out,
            noun: noun.into(),
            color: false,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }

    fn write_summary(&mut self, results: &RunResults) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "Validation summary:")?;
        for result in results {
            let status = if result.ok() {
                self.paint(&format!("{:10}", "OK"), "32")
            } else {
                self.paint(&format!("{:10}", status_label(result)), "31")
            };
            writeln!(
                self.out,
                "  {:28} {:2} {} {:6.2}s",
                result.candidate.name(),
                result.candidate.kind.label(),
                status,
                result.duration.as_secs_f64()
            )?;
        }
        writeln!(self.out)?;
        writeln!(self.out, "Passed {}/{} {}", results.passed(), results.total(), self.noun)?;

        let details: Vec<&ExecutionResult> = results
            .failed()
            .filter(|r| matches!(r.outcome, Outcome::StepError(_) | Outcome::Infrastructure(_)))
            .collect();
        if details.is_empty() {
            return Ok(());
        }

        let heading = self.paint("Detailed failures:", "1;31");
        writeln!(self.out)?;
        writeln!(self.out, "{}", heading)?;
        for result in details {
            match &result.outcome {
                Outcome::StepError(detail) => self.write_failure(detail)?,
                Outcome::Infrastructure(message) => {
                    writeln!(self.out)?;
                    writeln!(self.out, "--- {} ---", result.candidate.name())?;
                    writeln!(self.out, "{}", message)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn write_failure(&mut self, detail: &FailureDetail) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "--- {} (cell {}) ---", detail.notebook, detail.cell_index)?;
        writeln!(self.out, "{}: {}", detail.ename, detail.evalue)?;
        if !detail.traceback.is_empty() {
            writeln!(self.out, "Traceback (most recent call last):")?;
            let skip = detail.traceback.len().saturating_sub(TRACEBACK_LINES);
            for line in &detail.traceback[skip..] {
                writeln!(self.out, "{}", line)?;
            }
        }
        if !detail.snippet.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "Cell snippet:")?;
            writeln!(self.out, "{}", detail.snippet)?;
        }
        Ok(())
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn on_collection_complete(&mut self, count: usize) {
        tracing::info!(count, "collected candidates");
    }

    fn on_run_complete(&mut self, results: &RunResults) {
        if let Err(e) = self.write_summary(results) {
            tracing::warn!(error = %e, "failed to write console summary");
        }
    }
}

/// `OK`, `FAIL(code)` (timeouts report code 124) or `FAIL`.
pub fn status_label(result: &ExecutionResult) -> String {
    match &result.outcome {
        Outcome::Passed => "OK".to_string(),
        Outcome::TimedOut | Outcome::Exited(_) => format!("FAIL({})", result.exit_code()),
        Outcome::StepError(_) | Outcome::Infrastructure(_) => "FAIL".to_string(),
    }
}

// ============================================================================
// Report documents
// ============================================================================

/// One flat record per executed candidate, in discovery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub path: String,
    pub name: String,
    pub kind: CandidateKind,
    pub ok: bool,
    /// Seconds
    pub duration: f64,
    pub returncode: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
}

impl From<&ExecutionResult> for ReportRecord {
    fn from(result: &ExecutionResult) -> Self {
        let error = match &result.outcome {
            Outcome::Infrastructure(message) => Some(message.clone()),
            Outcome::TimedOut => Some("timed out".to_string()),
            _ => None,
        };
        Self {
            path: result.candidate.path.display().to_string(),
            name: result.candidate.name(),
            kind: result.candidate.kind,
            ok: result.ok(),
            duration: result.duration.as_secs_f64(),
            returncode: result.exit_code(),
            output_tail: result
                .output_tail
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(|t| process::tail(t, REPORT_OUTPUT_LIMIT).to_string()),
            error,
            failure: result.outcome.failure().cloned(),
        }
    }
}

/// Project results into report records.
pub fn records(results: &RunResults) -> Vec<ReportRecord> {
    results.iter().map(ReportRecord::from).collect()
}

/// Render the JSON report.
pub fn render_json(results: &RunResults) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(&records(results))?)
}

/// Render the Markdown report.
pub fn render_markdown(results: &RunResults, title: &str) -> String {
    let mut lines = vec![format!("# {} Validation Report", title), String::new()];
    for result in results {
        let status = if result.ok() {
            "✅ OK".to_string()
        } else {
            format!("❌ {}", status_label(result))
        };
        lines.push(format!(
            "- {} `{}` ({:.2}s)",
            status,
            result.candidate.name(),
            result.duration.as_secs_f64()
        ));
    }

    let failures: Vec<&FailureDetail> = results.failed().filter_map(|r| r.outcome.failure()).collect();
    if !failures.is_empty() {
        lines.push(String::new());
        lines.push("## Failures".to_string());
        for detail in failures {
            lines.push(String::new());
            lines.push(format!("### {} (cell {})", detail.notebook, detail.cell_index));
            lines.push(format!("**{}:** {}", detail.ename, detail.evalue));
            if !detail.snippet.is_empty() {
                lines.push(String::new());
                lines.push(format!("```python\n{}\n```", detail.snippet));
            }
        }
    }

    let mut doc = lines.join("\n");
    doc.push('\n');
    doc
}

/// Write a report document, creating parent directories as needed.
pub fn write_report(path: &Path, contents: &str) -> Result<(), ReportError> {
    let io_err = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, contents).map_err(io_err)
}
