//! Child process execution with a wall-clock timeout
//!
//! A `LaunchSpec` describes one child: program, arguments, extra environment
//! and optional stdin bytes. `run` starts it on the tokio runtime, pumps
//! stdout/stderr as lines in arrival order, and kills the child if the timeout
//! elapses first.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// How long output readers may keep draining after the child is gone.
///
/// A grandchild that inherited the pipes can hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Errors that prevent a child from running at all
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting on '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything needed to start one child process.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
    /// Written to the child's stdin, which is then closed
    pub stdin: Option<Vec<u8>>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Output captured from a child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// stdout and stderr lines interleaved in arrival order
    pub merged: String,
}

impl CapturedOutput {
    fn push(&mut self, stream: Stream, line: &str) {
        let target = match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        };
        target.push_str(line);
        target.push('\n');
        self.merged.push_str(line);
        self.merged.push('\n');
    }
}

/// How a child finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Exit code; `-1` when terminated by a signal
    Exited(i32),
    /// Killed after the timeout elapsed
    TimedOut,
}

/// Result of running a child to completion or timeout.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ProcessStatus,
    pub output: CapturedOutput,
    pub duration: Duration,
}

/// Run a child to completion, killing it if `timeout` elapses first.
#[tracing::instrument(skip_all, fields(program = %spec.program, timeout_ms = timeout.as_millis() as u64))]
pub async fn run(spec: &LaunchSpec, timeout: Duration) -> Result<ProcessOutput, ProcessError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.current_dir {
        command.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let (tx, mut rx) = mpsc::unbounded_channel::<(Stream, String)>();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(pump_lines(stdout, Stream::Stdout, tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(pump_lines(stderr, Stream::Stderr, tx.clone())));
    }
    drop(tx);

    if let (Some(mut stdin), Some(bytes)) = (child.stdin.take(), spec.stdin.clone()) {
        // A child that exits without reading stdin is not an error here.
        readers.push(tokio::spawn(async move {
            let _ = stdin.write_all(&bytes).await;
            let _ = stdin.shutdown().await;
        }));
    }

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => ProcessStatus::Exited(status.code().unwrap_or(-1)),
        Ok(Err(source)) => {
            return Err(ProcessError::Wait {
                program: spec.program.clone(),
                source,
            });
        }
        Err(_) => {
            tracing::debug!("timeout elapsed, killing child");
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "failed to kill timed out child");
            }
            ProcessStatus::TimedOut
        }
    };
    let duration = match status {
        ProcessStatus::TimedOut => timeout,
        ProcessStatus::Exited(_) => start.elapsed(),
    };

    let mut output = CapturedOutput::default();
    let drain_deadline = tokio::time::Instant::now() + DRAIN_GRACE;
    loop {
        match tokio::time::timeout_at(drain_deadline, rx.recv()).await {
            Ok(Some((stream, line))) => output.push(stream, &line),
            Ok(None) | Err(_) => break,
        }
    }
    for reader in readers {
        reader.abort();
    }

    Ok(ProcessOutput {
        status,
        output,
        duration,
    })
}

async fn pump_lines<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                // Invalid UTF-8 is replaced, never a reason to stop draining the pipe
                let line = String::from_utf8_lossy(trim_newline(&buf)).into_owned();
                if tx.send((stream, line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, ?stream, "stopped reading child output");
                break;
            }
        }
    }
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Last `max_chars` characters of `text`, on a char boundary.
pub fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

/// First `max_chars` characters of `text`, on a char boundary.
pub fn head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_code_and_merged_output() {
        let spec = LaunchSpec::new("sh").args(["-c", "echo out; echo err 1>&2; exit 3"]);
        let out = run(&spec, Duration::from_secs(10)).await.unwrap();
        assert_eq!(out.status, ProcessStatus::Exited(3));
        assert_eq!(out.output.stdout, "out\n");
        assert_eq!(out.output.stderr, "err\n");
        assert!(out.output.merged.contains("out\n"));
        assert!(out.output.merged.contains("err\n"));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let spec = LaunchSpec::new("sh").args(["-c", "exec sleep 5"]);
        let started = Instant::now();
        let out = run(&spec, Duration::from_millis(200)).await.unwrap();
        assert_eq!(out.status, ProcessStatus::TimedOut);
        assert_eq!(out.duration, Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_env_and_stdin_are_passed() {
        let spec = LaunchSpec::new("sh")
            .args(["-c", "printf '%s:' \"$HARNESS_PROBE\"; cat"])
            .envs(vec![("HARNESS_PROBE".to_string(), "yes".to_string())])
            .stdin(b"from-stdin\n".to_vec());
        let out = run(&spec, Duration::from_secs(10)).await.unwrap();
        assert_eq!(out.status, ProcessStatus::Exited(0));
        assert_eq!(out.output.stdout, "yes:from-stdin\n");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced_and_reading_continues() {
        let spec = LaunchSpec::new("sh").args(["-c", "printf 'caf\\351\\r\\n'; echo after"]);
        let out = run(&spec, Duration::from_secs(10)).await.unwrap();
        assert_eq!(out.status, ProcessStatus::Exited(0));
        assert_eq!(out.output.stdout, "caf\u{FFFD}\nafter\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let spec = LaunchSpec::new("definitely-not-a-real-program-xyz");
        let err = run(&spec, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn test_tail_and_head_respect_char_boundaries() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 5), "ab");
        assert_eq!(tail("héllo", 4), "éllo");
        assert_eq!(head("héllo", 2), "hé");
        assert_eq!(head("hi", 10), "hi");
    }
}
