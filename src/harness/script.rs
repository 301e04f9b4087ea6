//! Script executor
//!
//! Runs `.py` and `.sh` candidates as independent child processes with the
//! configured interpreter, merged output capture and a wall-clock timeout.

use std::io::Write;
use std::time::Duration;

use super::config::{EnvDefaults, HarnessConfig};
use super::process::{self, LaunchSpec, ProcessStatus};
use super::{Candidate, CandidateExecutor, CandidateKind, ExecutionResult, Outcome};
use crate::runtime;

/// Characters of captured output echoed to the console per script.
const CONSOLE_OUTPUT_LIMIT: usize = 10_000;
/// Characters of captured output kept on the result.
pub const OUTPUT_TAIL_LIMIT: usize = 5_000;

/// Executes script candidates as child processes.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    pub python: String,
    pub shell: String,
    pub timeout: Duration,
    pub env_defaults: EnvDefaults,
    /// Echo the per-script status line and captured output
    pub echo: bool,
}

impl ScriptExecutor {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            python: config.python.clone(),
            shell: config.shell.clone(),
            timeout: config.timeout,
            env_defaults: config.env_defaults.clone(),
            echo: !config.quiet,
        }
    }

    /// Build the launch spec for a candidate.
    pub fn launch_spec(&self, candidate: &Candidate) -> LaunchSpec {
        let program = match candidate.kind {
            CandidateKind::Shell => &self.shell,
            _ => &self.python,
        };
        LaunchSpec::new(program.clone())
            .arg(candidate.path.to_string_lossy().into_owned())
            .envs(self.env_defaults.resolve_for(candidate.kind))
    }

    async fn run(&self, candidate: &Candidate) -> ExecutionResult {
        let spec = self.launch_spec(candidate);
        let kind = candidate.kind;

        let output = match process::run(&spec, self.timeout).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(path = %candidate.path.display(), error = %e, "script could not be started");
                if self.echo {
                    println!("[{}] {} -> {}", kind, candidate.path.display(), e);
                }
                return ExecutionResult::new(candidate.clone(), Outcome::Infrastructure(e.to_string()), Duration::ZERO);
            }
        };

        let outcome = match output.status {
            ProcessStatus::Exited(0) => Outcome::Passed,
            ProcessStatus::Exited(code) => Outcome::Exited(code),
            ProcessStatus::TimedOut => Outcome::TimedOut,
        };

        if self.echo {
            let mut stdout = std::io::stdout().lock();
            let _ = match &outcome {
                Outcome::TimedOut => writeln!(
                    stdout,
                    "[{}] {} timed out ({}s)",
                    kind,
                    candidate.name(),
                    self.timeout.as_secs_f64()
                ),
                _ => writeln!(
                    stdout,
                    "[{}] {} -> rc={} ({:.2}s)",
                    kind,
                    candidate.path.display(),
                    outcome.exit_code(),
                    output.duration.as_secs_f64()
                ),
            };
            let merged = output.output.merged.trim();
            if !merged.is_empty() {
                let _ = writeln!(stdout, "{}", process::head(merged, CONSOLE_OUTPUT_LIMIT));
            }
        }

        ExecutionResult::new(candidate.clone(), outcome, output.duration)
            .with_output_tail(process::tail(&output.output.merged, OUTPUT_TAIL_LIMIT))
    }
}

impl CandidateExecutor for ScriptExecutor {
    #[tracing::instrument(skip_all, fields(path = %candidate.path.display(), kind = %candidate.kind))]
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
