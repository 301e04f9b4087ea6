#![forbid(unsafe_code)]
//! primer-check: validation harness for a Python teaching primer
//!
//! Discovers the primer's chapter scripts and notebooks, executes each one
//! under a wall-clock timeout, and reports pass/fail on the console and as
//! optional JSON and Markdown documents.
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` and `harness` modules
//!   enforce `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Candidate failures**: A script that crashes, hangs or cannot be launched is a recorded result, never a panic
//!   or an early return from the run.

pub mod cli;
pub mod harness;
pub mod runtime;

pub use harness::driver::{RunReport, RunStatus};
pub use harness::{Candidate, CandidateExecutor, CandidateKind, ExecutionResult, HarnessConfig, Outcome, RunResults};
