//! Subprocess Execution
//!
//! The client never spawns processes directly; it goes through
//! [`ProcessRunner`] so tests can substitute a recording fake.

use std::future::Future;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Captured result of one process invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    /// Successful exit with the given stdout
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { stdout: stdout.into(), stderr: String::new(), exit_code: Some(0) }
    }

    /// Failed exit with the given stderr
    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self { stdout: String::new(), stderr: stderr.into(), exit_code: Some(exit_code) }
    }

    #[must_use]
    pub const fn exited_successfully(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Per-invocation settings passed straight through to the runner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Kill the process if it runs longer than this
    pub timeout: Option<Duration>,
}

/// Runs an executable with an argument vector and captures its output
///
/// Arguments are handed to the OS as a vector; no shell is involved.
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args`
    ///
    /// An `Err` means the process could not be started or timed out; a
    /// non-zero exit is reported through [`ProcessOutput::exit_code`].
    fn run(
        &self,
        program: &Path,
        args: &[String],
        options: &RunOptions,
    ) -> impl Future<Output = io::Result<ProcessOutput>> + Send;
}

/// [`ProcessRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        options: &RunOptions,
    ) -> io::Result<ProcessOutput> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match options.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output()).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("process did not finish within {limit:?}"),
                )
            })??,
            None => command.output().await?,
        };

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
