//! Invocation of the external container-runtime and packet-capture CLIs.
//!
//! Every collector in this crate talks to the outside world through the
//! [`Runner`] trait: a single-shot `run` that captures stdout, plus a
//! streaming spawn on [`SystemRunner`] for processes that outlive one call
//! (packet capture). Keeping the trait at this seam lets every collector be
//! driven by a scripted mock in tests.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::process::{Child, ChildStdout, Command};

mod error;

pub use error::{ExecutionError, Result};

/// Default upper bound for a single-shot command invocation.
const RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes an external command and captures its output.
pub trait Runner: Send + Sync {
    /// Runs `argv` to completion and returns captured stdout.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecutionError`] if the command cannot be spawned, exits
    /// non-zero, or does not complete in time.
    fn run(&self, argv: &[String]) -> impl Future<Output = Result<String>> + Send;
}

/// A [`Runner`] backed by real subprocesses via [`tokio::process`].
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self {
            timeout: RUN_TIMEOUT,
        }
    }
}

impl SystemRunner {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Spawns `argv` as a long-lived child with piped stdout.
    ///
    /// Intended for streaming tools that emit lines indefinitely until
    /// killed. The returned [`CaptureChild`] owns the process; dropping it
    /// without calling [`CaptureChild::kill`] leaves the child running.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Spawn`] if the process cannot be started.
    pub fn spawn_streaming(argv: &[String]) -> Result<CaptureChild> {
        let (program, args) = split_argv(argv);
        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                program: program.to_owned(),
                source,
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::MissingStdout {
                program: program.to_owned(),
            })?;
        log::debug!(
            "spawned streaming `{}` (pid={:?})",
            program,
            child.id()
        );
        Ok(CaptureChild {
            program: program.to_owned(),
            child,
            stdout: Some(stdout),
        })
    }
}

impl Runner for SystemRunner {
    async fn run(&self, argv: &[String]) -> Result<String> {
        let (program, args) = split_argv(argv);
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| ExecutionError::Timeout {
                program: program.to_owned(),
                timeout: self.timeout,
            })?
            .map_err(|source| ExecutionError::Spawn {
                program: program.to_owned(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExecutionError::Failed {
                program: program.to_owned(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// A spawned streaming subprocess and its line-producing stdout.
#[derive(Debug)]
pub struct CaptureChild {
    program: String,
    child: Child,
    stdout: Option<ChildStdout>,
}

impl CaptureChild {
    /// Takes the buffered stdout reader. Can only be taken once.
    pub fn take_stdout(&mut self) -> Option<BufReader<ChildStdout>> {
        self.stdout.take().map(BufReader::new)
    }

    /// Kills the child and reaps it. Unblocks any pending read on stdout.
    pub async fn kill(&mut self) {
        if let Err(err) = self.child.kill().await {
            log::warn!("failed to kill `{}`: {err}", self.program);
        }
    }

    /// Waits for the child to exit on its own and returns its status.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Wait`] if waiting on the process fails.
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        self.child
            .wait()
            .await
            .map_err(|source| ExecutionError::Wait {
                program: self.program.clone(),
                source,
            })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

fn split_argv(argv: &[String]) -> (&str, &[String]) {
    match argv {
        [] => ("", &[]),
        [program, args @ ..] => (program.as_str(), args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_owned()).collect()
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let runner = SystemRunner::default();
        let out = runner.run(&argv(&["echo", "hello"])).await.unwrap();
        assert_eq!(out, "hello\n");
    }

    #[tokio::test]
    async fn test_run_empty_output_is_ok() {
        let runner = SystemRunner::default();
        let out = runner.run(&argv(&["true"])).await.unwrap();
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn test_run_missing_binary() {
        let runner = SystemRunner::default();
        let err = runner
            .run(&argv(&["/definitely/does/not/exist"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_carries_code_and_stderr() {
        let runner = SystemRunner::default();
        let err = runner
            .run(&argv(&["sh", "-c", "echo oops >&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            ExecutionError::Failed {
                program,
                code,
                stderr,
            } => {
                assert_eq!(program, "sh");
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let runner = SystemRunner::with_timeout(Duration::from_millis(50));
        let err = runner.run(&argv(&["sleep", "5"])).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_spawn_streaming_reads_lines() {
        use tokio::io::AsyncBufReadExt;

        let mut child =
            SystemRunner::spawn_streaming(&argv(&["sh", "-c", "printf 'a\\nb\\n'"])).unwrap();
        let mut lines = child.take_stdout().unwrap().lines();
        assert_eq!(lines.next_line().await.unwrap(), Some("a".to_owned()));
        assert_eq!(lines.next_line().await.unwrap(), Some("b".to_owned()));
        assert_eq!(lines.next_line().await.unwrap(), None);
        assert!(child.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_kill_unblocks_stream() {
        use tokio::io::AsyncBufReadExt;

        let mut child =
            SystemRunner::spawn_streaming(&argv(&["sh", "-c", "echo go; sleep 30"])).unwrap();
        let mut lines = child.take_stdout().unwrap().lines();
        assert_eq!(lines.next_line().await.unwrap(), Some("go".to_owned()));
        child.kill().await;
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}
