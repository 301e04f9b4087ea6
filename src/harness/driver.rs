//! Harness driver
//!
//! `collecting → (listing-only) → executing → summarizing → reporting`
//!
//! The driver owns no execution logic of its own: discovery, the executor and
//! the reporter are passed in, and the return value says which exit status the
//! run maps to.

use std::io::Write;

use super::config::HarnessConfig;
use super::discovery::{self, DiscoveryError};
use super::report::{self, Reporter};
use super::result::RunResults;
use super::{Candidate, CandidateExecutor};

/// How a run ended, mapped to a process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Everything executed passed, or the run only listed candidates
    Passed,
    /// Discovery found nothing
    NothingDiscovered,
    /// At least one executed candidate failed
    Failed,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Passed => 0,
            RunStatus::NothingDiscovered => 1,
            RunStatus::Failed => 2,
        }
    }
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub candidates: Vec<Candidate>,
    pub results: RunResults,
}

/// Run the full pipeline for `config`.
///
/// Only discovery errors (bad glob syntax) are returned as `Err`; every
/// candidate-level failure is recorded in the results instead.
#[tracing::instrument(skip_all, fields(noun = %config.noun, fail_fast = config.fail_fast))]
pub fn run(
    config: &HarnessConfig,
    executor: &dyn CandidateExecutor,
    reporter: &mut dyn Reporter,
) -> Result<RunReport, DiscoveryError> {
    let mut stdout = std::io::stdout();
    run_with_output(config, executor, reporter, &mut stdout)
}

/// `run`, with listing and "nothing found" messages written to `out`.
pub fn run_with_output(
    config: &HarnessConfig,
    executor: &dyn CandidateExecutor,
    reporter: &mut dyn Reporter,
    out: &mut dyn Write,
) -> Result<RunReport, DiscoveryError> {
    let includes = config.effective_includes();
    let candidates = discovery::discover(&config.root, &includes, &config.excludes, &config.default_pattern)?;
    reporter.on_collection_complete(candidates.len());

    if candidates.is_empty() {
        let _ = writeln!(out, "No {} found for patterns: {:?}", config.noun, includes);
        return Ok(RunReport {
            status: RunStatus::NothingDiscovered,
            candidates,
            results: RunResults::new(),
        });
    }

    if config.list_only {
        for candidate in &candidates {
            let _ = writeln!(out, "[{}] {}", candidate.kind, candidate.path.display());
        }
        return Ok(RunReport {
            status: RunStatus::Passed,
            candidates,
            results: RunResults::new(),
        });
    }

    let mut results = RunResults::new();
    for candidate in &candidates {
        reporter.on_candidate_start(candidate);
        let result = executor.execute(candidate);
        reporter.on_candidate_complete(&result);

        let failed = !result.ok();
        results.push(result);
        if failed && config.fail_fast {
            tracing::info!(path = %candidate.path.display(), "stopping after first failure");
            break;
        }
    }

    reporter.on_run_complete(&results);
    write_reports(config, &results);

    let status = if results.all_passed() {
        RunStatus::Passed
    } else {
        RunStatus::Failed
    };
    Ok(RunReport {
        status,
        candidates,
        results,
    })
}

/// Write the configured report documents. Failures are warnings, never fatal.
fn write_reports(config: &HarnessConfig, results: &RunResults) {
    if let Some(path) = &config.report_json {
        let written = report::render_json(results).and_then(|json| report::write_report(path, &json));
        if let Err(e) = written {
            warn_report(&e);
        }
    }

    if let Some(path) = &config.report_md {
        let doc = report::render_markdown(results, &config.report_title);
        if let Err(e) = report::write_report(path, &doc) {
            warn_report(&e);
        }
    }
}

fn warn_report(error: &report::ReportError) {
    tracing::warn!(error = %error, "report not written");
    eprintln!("warning: {}", error);
}
