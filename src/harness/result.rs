//! Execution results and their ordered aggregate

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Candidate, TIMEOUT_EXIT_CODE};

/// Step-level detail for a notebook that raised during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Notebook file name
    pub notebook: String,
    /// 0-based index of the failing cell
    pub cell_index: usize,
    /// Exception class name
    pub ename: String,
    /// Exception message
    pub evalue: String,
    pub traceback: Vec<String>,
    /// First lines of the failing cell's source
    pub snippet: String,
}

/// Terminal outcome of one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    /// Script exited with a non-zero code
    Exited(i32),
    /// Killed by the wall-clock timeout
    TimedOut,
    /// A notebook step raised a structured error
    StepError(FailureDetail),
    /// The candidate could not be launched, loaded or executed
    Infrastructure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Passed)
    }

    /// Exit/status code recorded for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Passed => 0,
            Outcome::Exited(code) => *code,
            Outcome::TimedOut => TIMEOUT_EXIT_CODE,
            Outcome::StepError(_) | Outcome::Infrastructure(_) => 1,
        }
    }

    pub fn failure(&self) -> Option<&FailureDetail> {
        match self {
            Outcome::StepError(detail) => Some(detail),
            _ => None,
        }
    }
}

/// Result of executing a single candidate. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub candidate: Candidate,
    pub outcome: Outcome,
    pub duration: Duration,
    /// Tail of the captured (merged) output, scripts only
    pub output_tail: Option<String>,
}

impl ExecutionResult {
    pub fn new(candidate: Candidate, outcome: Outcome, duration: Duration) -> Self {
        Self {
            candidate,
            outcome,
            duration,
            output_tail: None,
        }
    }

    pub fn with_output_tail(mut self, tail: impl Into<String>) -> Self {
        self.output_tail = Some(tail.into());
        self
    }

    pub fn ok(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }
}

/// Results of a run, in discovery order.
#[derive(Debug, Default)]
pub struct RunResults {
    results: Vec<ExecutionResult>,
}

impl RunResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: ExecutionResult) {
        self.results.push(result);
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.ok()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.ok())
    }

    pub fn all_passed(&self) -> bool {
        self.results.iter().all(ExecutionResult::ok)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExecutionResult> {
        self.results.iter()
    }

    pub fn as_slice(&self) -> &[ExecutionResult] {
        &self.results
    }
}

impl<'a> IntoIterator for &'a RunResults {
    type Item = &'a ExecutionResult;
    type IntoIter = std::slice::Iter<'a, ExecutionResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, outcome: Outcome) -> ExecutionResult {
        ExecutionResult::new(Candidate::new(name), outcome, Duration::from_millis(10))
    }

    #[test]
    fn test_exit_codes_per_outcome() {
        assert_eq!(Outcome::Passed.exit_code(), 0);
        assert_eq!(Outcome::Exited(3).exit_code(), 3);
        assert_eq!(Outcome::TimedOut.exit_code(), 124);
        assert_eq!(Outcome::Infrastructure("boom".into()).exit_code(), 1);
    }

    #[test]
    fn test_aggregate_counts_preserve_order() {
        let mut results = RunResults::new();
        results.push(result("a.py", Outcome::Passed));
        results.push(result("b.py", Outcome::Exited(1)));
        results.push(result("c.py", Outcome::TimedOut));

        assert_eq!(results.total(), 3);
        assert_eq!(results.passed(), 1);
        assert!(!results.all_passed());

        let failed: Vec<_> = results.failed().map(|r| r.candidate.name()).collect();
        assert_eq!(failed, vec!["b.py", "c.py"]);

        let order: Vec<_> = results.iter().map(|r| r.candidate.name()).collect();
        assert_eq!(order, vec!["a.py", "b.py", "c.py"]);
    }

    #[test]
    fn test_empty_aggregate_all_passed() {
        let results = RunResults::new();
        assert_eq!(results.total(), 0);
        assert!(results.all_passed());
    }
}
