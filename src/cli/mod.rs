//! CLI module for primer-check
//!
//! This module provides the command-line interface for the harness.
//!
//! ## Commands
//!
//! - `code` - Run chapter scripts (`code/NN_*.py`, optionally `NN_*.sh`)
//! - `notebooks` - Execute notebooks through a Jupyter kernel
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }

    /// Create an error with a custom exit code.
    pub fn with_code(message: impl Into<String>, code: i32) -> Self {
        Self::new(message, ExitCode(code))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Validate primer chapter scripts and notebooks
#[derive(Parser, Debug)]
#[command(name = "primer-check")]
#[command(version = VERSION)]
#[command(about = "Discover, execute and report on primer scripts and notebooks", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Glob of files to include (repeatable; replaces the default pattern)
    #[arg(long = "include", value_name = "GLOB")]
    pub include: Vec<String>,
    /// Glob of files to exclude (repeatable; applied after include)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,
    /// Stop at the first failure
    #[arg(short = 'x', long = "fail-fast")]
    pub fail_fast: bool,
    /// List discovered files and exit
    #[arg(long = "list")]
    pub list: bool,
    /// Write a JSON report with detailed results
    #[arg(long = "report-json", value_name = "PATH")]
    pub report_json: Option<PathBuf>,
    /// Write a Markdown summary report
    #[arg(long = "report-md", value_name = "PATH")]
    pub report_md: Option<PathBuf>,
    /// Do not echo per-file progress and captured output
    #[arg(short, long)]
    pub quiet: bool,
    /// Directory the patterns are resolved against
    #[arg(long = "root", value_name = "DIR", default_value = ".")]
    pub root: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run chapter scripts (code/NN_*.py) under a per-script timeout
    Code {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Also run bash scripts (code/NN_*.sh) with PRIMER_DRY_RUN=1
        #[arg(long = "with-bash")]
        with_bash: bool,
        /// Per-script timeout in seconds
        #[arg(long, value_name = "SECS", default_value = "60", value_parser = parse_timeout)]
        timeout: Duration,
        /// Interpreter for Python scripts
        #[arg(long, value_name = "PROGRAM", default_value = "python3")]
        python: String,
        /// Interpreter for bash scripts
        #[arg(long, value_name = "PROGRAM", default_value = "bash")]
        shell: String,
    },

    /// Execute notebooks (notebooks/*.ipynb) through a Jupyter kernel
    Notebooks {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Per-notebook timeout in seconds
        #[arg(long, value_name = "SECS", default_value = "300", value_parser = parse_timeout)]
        timeout: Duration,
        /// Jupyter kernel name
        #[arg(long, value_name = "NAME", default_value = "python3")]
        kernel: String,
        /// Directory for executed notebook copies
        #[arg(long = "executed-dir", value_name = "DIR", default_value = "tools/_executed")]
        executed_dir: PathBuf,
        /// Jupyter launcher program
        #[arg(long, value_name = "PROGRAM", default_value = "jupyter")]
        jupyter: String,
        /// Write normalized notebooks (cell ids added) back to their source files
        #[arg(long = "write-normalized")]
        write_normalized: bool,
    },
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let secs: f64 = value.parse().map_err(|_| format!("'{}' is not a number of seconds", value))?;
    match Duration::try_from_secs_f64(secs) {
        Ok(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(format!("timeout must be a positive number of seconds, got {}", value)),
    }
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Code {
            selection,
            with_bash,
            timeout,
            python,
            shell,
        } => commands::validate_code(commands::CodeOptions {
            selection,
            with_bash,
            timeout,
            python,
            shell,
        }),
        Command::Notebooks {
            selection,
            timeout,
            kernel,
            executed_dir,
            jupyter,
            write_normalized,
        } => commands::validate_notebooks(commands::NotebookOptions {
            selection,
            timeout,
            kernel,
            executed_dir,
            jupyter,
            write_normalized,
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
