//! Harness configuration
//!
//! One `HarnessConfig` drives a whole run. The CLI builds it from flags; tests
//! build it directly with the `with_*` methods.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::CandidateKind;

/// Default per-script timeout (`code` subcommand).
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default per-notebook timeout (`notebooks` subcommand).
pub const DEFAULT_NOTEBOOK_TIMEOUT: Duration = Duration::from_secs(300);

/// Default discovery pattern for chapter scripts.
pub const DEFAULT_SCRIPT_PATTERN: &str = "code/[0-9][0-9]_*.py";
/// Pattern added by `--with-bash`.
pub const DEFAULT_SHELL_PATTERN: &str = "code/[0-9][0-9]_*.sh";
/// Default discovery pattern for notebooks.
pub const DEFAULT_NOTEBOOK_PATTERN: &str = "notebooks/*.ipynb";

/// Environment variables a child gets unless the parent already sets them.
///
/// This is merged into each launch spec; the harness never mutates its own
/// process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvDefaults {
    /// Applied to every candidate
    pub common: BTreeMap<String, String>,
    /// Applied only to shell candidates
    pub shell: BTreeMap<String, String>,
}

impl Default for EnvDefaults {
    fn default() -> Self {
        let mut common = BTreeMap::new();
        common.insert("MPLBACKEND".to_string(), "Agg".to_string());
        let mut shell = BTreeMap::new();
        shell.insert("PRIMER_DRY_RUN".to_string(), "1".to_string());
        Self { common, shell }
    }
}

impl EnvDefaults {
    /// No defaults at all.
    pub fn empty() -> Self {
        Self {
            common: BTreeMap::new(),
            shell: BTreeMap::new(),
        }
    }

    /// Defaults for a candidate kind, minus anything `is_set` reports as present.
    pub fn resolve(&self, kind: CandidateKind, is_set: impl Fn(&str) -> bool) -> Vec<(String, String)> {
        let shell = if kind == CandidateKind::Shell {
            Some(&self.shell)
        } else {
            None
        };
        self.common
            .iter()
            .chain(shell.into_iter().flatten())
            .filter(|(key, _)| !is_set(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Resolve against the current process environment.
    pub fn resolve_for(&self, kind: CandidateKind) -> Vec<(String, String)> {
        self.resolve(kind, |key| std::env::var_os(key).is_some())
    }
}

/// Configuration for a harness run
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Directory patterns are resolved against
    pub root: PathBuf,
    /// Include globs; empty means `default_pattern`
    pub includes: Vec<String>,
    /// Exclude globs, applied after include
    pub excludes: Vec<String>,
    /// Fallback include pattern
    pub default_pattern: String,
    /// Per-candidate wall-clock timeout
    pub timeout: Duration,
    /// Stop after the first failing candidate
    pub fail_fast: bool,
    /// Print discovered candidates and exit
    pub list_only: bool,
    /// Suppress captured script output on the console
    pub quiet: bool,
    /// Noun used in console and report text ("scripts", "notebooks")
    pub noun: String,
    /// Markdown report title prefix ("Code", "Notebook")
    pub report_title: String,
    /// Interpreter for Python candidates
    pub python: String,
    /// Interpreter for shell candidates
    pub shell: String,
    /// Jupyter kernel name for notebooks
    pub kernel: String,
    /// Launcher for the notebook kernel bridge
    pub jupyter: String,
    /// Where executed notebook copies are written
    pub executed_dir: PathBuf,
    /// Write normalized notebooks back to their source path
    pub write_normalized: bool,
    /// Environment defaults for children
    pub env_defaults: EnvDefaults,
    /// Optional JSON report path
    pub report_json: Option<PathBuf>,
    /// Optional Markdown report path
    pub report_md: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            includes: Vec::new(),
            excludes: Vec::new(),
            default_pattern: DEFAULT_SCRIPT_PATTERN.to_string(),
            timeout: DEFAULT_SCRIPT_TIMEOUT,
            fail_fast: false,
            list_only: false,
            quiet: false,
            noun: "scripts".to_string(),
            report_title: "Code".to_string(),
            python: "python3".to_string(),
            shell: "bash".to_string(),
            kernel: "python3".to_string(),
            jupyter: "jupyter".to_string(),
            executed_dir: PathBuf::from("tools/_executed"),
            write_normalized: false,
            env_defaults: EnvDefaults::default(),
            report_json: None,
            report_md: None,
        }
    }
}

impl HarnessConfig {
    /// Defaults for validating chapter scripts
    pub fn scripts() -> Self {
        Self::default()
    }

    /// Defaults for validating notebooks
    pub fn notebooks() -> Self {
        Self {
            default_pattern: DEFAULT_NOTEBOOK_PATTERN.to_string(),
            timeout: DEFAULT_NOTEBOOK_TIMEOUT,
            noun: "notebooks".to_string(),
            report_title: "Notebook".to_string(),
            ..Self::default()
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_includes(mut self, includes: Vec<String>) -> Self {
        self.includes = includes;
        self
    }

    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_list_only(mut self, list_only: bool) -> Self {
        self.list_only = list_only;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_kernel(mut self, kernel: impl Into<String>) -> Self {
        self.kernel = kernel.into();
        self
    }

    pub fn with_jupyter(mut self, jupyter: impl Into<String>) -> Self {
        self.jupyter = jupyter.into();
        self
    }

    pub fn with_executed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.executed_dir = dir.into();
        self
    }

    pub fn with_write_normalized(mut self, write: bool) -> Self {
        self.write_normalized = write;
        self
    }

    pub fn with_env_defaults(mut self, env_defaults: EnvDefaults) -> Self {
        self.env_defaults = env_defaults;
        self
    }

    pub fn with_report_json(mut self, path: Option<PathBuf>) -> Self {
        self.report_json = path;
        self
    }

    pub fn with_report_md(mut self, path: Option<PathBuf>) -> Self {
        self.report_md = path;
        self
    }

    /// Include patterns actually used for discovery.
    pub fn effective_includes(&self) -> Vec<String> {
        if self.includes.is_empty() {
            vec![self.default_pattern.clone()]
        } else {
            self.includes.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_defaults() {
        let config = HarnessConfig::scripts();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.effective_includes(), vec![DEFAULT_SCRIPT_PATTERN.to_string()]);
        assert_eq!(config.noun, "scripts");
        assert!(!config.fail_fast);
    }

    #[test]
    fn test_notebook_defaults() {
        let config = HarnessConfig::notebooks();
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.kernel, "python3");
        assert_eq!(config.executed_dir, PathBuf::from("tools/_executed"));
        assert_eq!(config.effective_includes(), vec![DEFAULT_NOTEBOOK_PATTERN.to_string()]);
    }

    #[test]
    fn test_user_includes_replace_default() {
        let config = HarnessConfig::scripts().with_includes(vec!["code/0*.py".to_string()]);
        assert_eq!(config.effective_includes(), vec!["code/0*.py".to_string()]);
    }

    #[test]
    fn test_env_defaults_only_when_absent() {
        let defaults = EnvDefaults::default();

        let py = defaults.resolve(CandidateKind::Python, |_| false);
        assert_eq!(py, vec![("MPLBACKEND".to_string(), "Agg".to_string())]);

        let sh = defaults.resolve(CandidateKind::Shell, |_| false);
        assert_eq!(sh.len(), 2);
        assert!(sh.contains(&("PRIMER_DRY_RUN".to_string(), "1".to_string())));

        let sh = defaults.resolve(CandidateKind::Shell, |key| key == "MPLBACKEND");
        assert_eq!(sh, vec![("PRIMER_DRY_RUN".to_string(), "1".to_string())]);
    }
}
