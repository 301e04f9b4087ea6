//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::path::PathBuf;
use std::time::Duration;

use crate::harness::config::{DEFAULT_SCRIPT_PATTERN, DEFAULT_SHELL_PATTERN};
use crate::harness::driver::{self, RunStatus};
use crate::harness::notebook::NotebookExecutor;
use crate::harness::report::ConsoleReporter;
use crate::harness::script::ScriptExecutor;
use crate::harness::{CandidateExecutor, HarnessConfig};

use super::{CliError, CliResult, ExitCode, SelectionArgs};

/// Options of the `code` subcommand
#[derive(Debug, Clone)]
pub struct CodeOptions {
    pub selection: SelectionArgs,
    pub with_bash: bool,
    pub timeout: Duration,
    pub python: String,
    pub shell: String,
}

/// Options of the `notebooks` subcommand
#[derive(Debug, Clone)]
pub struct NotebookOptions {
    pub selection: SelectionArgs,
    pub timeout: Duration,
    pub kernel: String,
    pub executed_dir: PathBuf,
    pub jupyter: String,
    pub write_normalized: bool,
}

/// Apply the flags every subcommand shares.
fn apply_selection(config: HarnessConfig, selection: SelectionArgs, includes: Vec<String>) -> HarnessConfig {
    config
        .with_root(selection.root)
        .with_includes(includes)
        .with_excludes(selection.exclude)
        .with_fail_fast(selection.fail_fast)
        .with_list_only(selection.list)
        .with_quiet(selection.quiet)
        .with_report_json(selection.report_json)
        .with_report_md(selection.report_md)
}

/// Build the configuration for `primer-check code`.
pub fn code_config(options: CodeOptions) -> HarnessConfig {
    let mut includes = options.selection.include.clone();
    if options.with_bash {
        if includes.is_empty() {
            includes.push(DEFAULT_SCRIPT_PATTERN.to_string());
        }
        includes.push(DEFAULT_SHELL_PATTERN.to_string());
    }

    apply_selection(HarnessConfig::scripts(), options.selection, includes)
        .with_timeout(options.timeout)
        .with_python(options.python)
        .with_shell(options.shell)
}

/// Build the configuration for `primer-check notebooks`.
pub fn notebook_config(options: NotebookOptions) -> HarnessConfig {
    let includes = options.selection.include.clone();
    apply_selection(HarnessConfig::notebooks(), options.selection, includes)
        .with_timeout(options.timeout)
        .with_kernel(options.kernel)
        .with_executed_dir(options.executed_dir)
        .with_jupyter(options.jupyter)
        .with_write_normalized(options.write_normalized)
}

/// Run chapter scripts.
pub fn validate_code(options: CodeOptions) -> CliResult<ExitCode> {
    let config = code_config(options);
    let executor = ScriptExecutor::from_config(&config);
    run_harness(&config, &executor)
}

/// Execute notebooks.
pub fn validate_notebooks(options: NotebookOptions) -> CliResult<ExitCode> {
    let config = notebook_config(options);
    let executor = NotebookExecutor::from_config(&config);
    run_harness(&config, &executor)
}

fn run_harness(config: &HarnessConfig, executor: &dyn CandidateExecutor) -> CliResult<ExitCode> {
    let mut reporter = ConsoleReporter::stdout(config.noun.clone());
    let report =
        driver::run(config, executor, &mut reporter).map_err(|e| CliError::failure(format!("Error: {}", e)))?;

    match report.status {
        RunStatus::Passed => Ok(ExitCode::SUCCESS),
        // Summary or "nothing found" message already printed
        status => Err(CliError::with_code("", status.exit_code())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection() -> SelectionArgs {
        SelectionArgs {
            include: Vec::new(),
            exclude: Vec::new(),
            fail_fast: false,
            list: false,
            report_json: None,
            report_md: None,
            quiet: true,
            root: PathBuf::from("."),
        }
    }

    #[test]
    fn test_with_bash_extends_default_pattern() {
        let config = code_config(CodeOptions {
            selection: selection(),
            with_bash: true,
            timeout: Duration::from_secs(5),
            python: "python3".to_string(),
            shell: "bash".to_string(),
        });
        assert_eq!(
            config.effective_includes(),
            vec![DEFAULT_SCRIPT_PATTERN.to_string(), DEFAULT_SHELL_PATTERN.to_string()]
        );
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.quiet);
    }

    #[test]
    fn test_notebook_config_carries_kernel_settings() {
        let config = notebook_config(NotebookOptions {
            selection: selection(),
            timeout: Duration::from_secs(30),
            kernel: "ir".to_string(),
            executed_dir: PathBuf::from("out/executed"),
            jupyter: "/opt/jupyter".to_string(),
            write_normalized: true,
        });
        assert_eq!(config.kernel, "ir");
        assert_eq!(config.executed_dir, PathBuf::from("out/executed"));
        assert_eq!(config.jupyter, "/opt/jupyter");
        assert!(config.write_normalized);
        assert_eq!(config.noun, "notebooks");
    }
}
