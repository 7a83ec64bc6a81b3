//! Job execution: running the external command and judging its outcome.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use job_core::{CommandBuilder, CommandError, Job};
use tokio::process::Command;

/// Captured result of one external process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Reasons a job could not be run at all.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("cannot build command: {0}")]
    Build(#[from] CommandError),

    #[error("cannot spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Future type for async job execution.
pub type ExecFuture = Pin<Box<dyn Future<Output = Result<ProcessOutput, ExecError>> + Send>>;

/// Runs a job to completion.
pub trait JobExecutor: Send + Sync + 'static {
    fn execute(&self, job: &Job) -> ExecFuture;
}

/// Executes jobs as child processes built by a [`CommandBuilder`].
///
/// Waits for the child to exit and captures both output streams; there is
/// no timeout.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    builder: CommandBuilder,
}

impl ProcessExecutor {
    pub fn new(builder: CommandBuilder) -> Self {
        Self { builder }
    }

    pub fn builder(&self) -> &CommandBuilder {
        &self.builder
    }
}

impl JobExecutor for ProcessExecutor {
    fn execute(&self, job: &Job) -> ExecFuture {
        let job_id = job.id;
        let invocation = self.builder.build(job);

        Box::pin(async move {
            let invocation = invocation?;
            tracing::info!("Job {} running: {}", job_id, invocation.display());

            let output = Command::new(&invocation.program)
                .args(&invocation.args)
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|source| ExecError::Spawn {
                    program: invocation.program.display().to_string(),
                    source,
                })?;

            Ok(ProcessOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// A closure-based executor.
pub struct FnExecutor<F>
where
    F: Fn(&Job) -> ExecFuture + Send + Sync + 'static,
{
    executor: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&Job) -> ExecFuture + Send + Sync + 'static,
{
    pub fn new(executor: F) -> Self {
        Self { executor }
    }
}

impl<F> JobExecutor for FnExecutor<F>
where
    F: Fn(&Job) -> ExecFuture + Send + Sync + 'static,
{
    fn execute(&self, job: &Job) -> ExecFuture {
        (self.executor)(job)
    }
}

/// Decides whether a finished process failed.
pub trait FailurePolicy: Send + Sync + 'static {
    /// The error text to record, or `None` for success.
    fn failure(&self, output: &ProcessOutput) -> Option<String>;
}

/// Marker the provisioning tool prints to stderr when it crashes.
pub const DEFAULT_FAILURE_MARKER: &str = "Traceback";

/// Fails a run whose standard error contains a marker string.
///
/// The exit code is ignored: the tool is known to exit 0 after printing a
/// traceback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPolicy {
    marker: String,
}

impl MarkerPolicy {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl Default for MarkerPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_MARKER)
    }
}

impl FailurePolicy for MarkerPolicy {
    fn failure(&self, output: &ProcessOutput) -> Option<String> {
        output
            .stderr
            .contains(&self.marker)
            .then(|| output.stderr.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: i32, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn marker_in_stderr_is_a_failure() {
        let policy = MarkerPolicy::default();
        let stderr = "Traceback (most recent call last):\n  KeyError: 'size'\n";
        assert_eq!(policy.failure(&output(0, stderr)), Some(stderr.to_string()));
    }

    #[test]
    fn exit_code_alone_is_not_a_failure() {
        let policy = MarkerPolicy::default();
        assert_eq!(policy.failure(&output(1, "warning: slow disk\n")), None);
        assert_eq!(policy.failure(&output(0, "")), None);
    }

    #[test]
    fn marker_in_stdout_is_ignored() {
        let policy = MarkerPolicy::default();
        let out = ProcessOutput {
            exit_code: Some(0),
            stdout: "Traceback".into(),
            stderr: String::new(),
        };
        assert_eq!(policy.failure(&out), None);
    }

    #[test]
    fn custom_marker() {
        let policy = MarkerPolicy::new("FATAL");
        assert!(policy.failure(&output(0, "FATAL: quota")).is_some());
        assert!(policy.failure(&output(0, "Traceback")).is_none());
    }
}
