//! Turns a stored job into the command line of the external provisioning tool.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::Job;

/// File name of the interpreter that launches the tool.
pub const LAUNCHER: &str = "python";
/// File name of the tool's entry point.
pub const ENTRYPOINT: &str = "dlab";

/// Errors produced while building a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("cannot resolve installation directory: {0}")]
    InstallDir(#[from] std::io::Error),

    #[error("request of job {job} is not valid JSON: {source}")]
    InvalidRequest {
        job: crate::JobId,
        source: serde_json::Error,
    },

    #[error("request of job {0} is not a JSON object")]
    NotAnObject(crate::JobId),
}

/// A fully resolved external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to execute (the launcher).
    pub program: PathBuf,
    /// Arguments: entry point, resource, action, then one `--key=value` per
    /// request entry.
    pub args: Vec<String>,
}

impl Invocation {
    /// Render the invocation as a single line for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Builds invocations relative to a fixed installation directory.
///
/// Building is pure: the same job always yields the same invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuilder {
    install_dir: PathBuf,
}

impl CommandBuilder {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    /// Use the directory holding the running executable.
    pub fn from_current_exe() -> Result<Self, CommandError> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().map(Path::to_path_buf).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} has no parent directory", exe.display()),
            )
        })?;
        Ok(Self::new(dir))
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn launcher(&self) -> PathBuf {
        self.install_dir.join(LAUNCHER)
    }

    pub fn entrypoint(&self) -> PathBuf {
        self.install_dir.join(ENTRYPOINT)
    }

    /// Build the invocation for a job.
    pub fn build(&self, job: &Job) -> Result<Invocation, CommandError> {
        let request: Value =
            serde_json::from_str(&job.request).map_err(|source| CommandError::InvalidRequest {
                job: job.id,
                source,
            })?;
        let Value::Object(entries) = request else {
            return Err(CommandError::NotAnObject(job.id));
        };

        let mut args = Vec::with_capacity(entries.len() + 3);
        args.push(self.entrypoint().display().to_string());
        args.push(job.resource.clone());
        args.push(job.action.clone());
        args.extend(entries.iter().map(|(key, value)| flag(key, value)));

        Ok(Invocation {
            program: self.launcher(),
            args,
        })
    }
}

/// Format one request entry as `--key=value`, hyphens in the key becoming
/// underscores.
fn flag(key: &str, value: &Value) -> String {
    format!("--{}={}", key.replace('-', "_"), render(value))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            value.to_string()
        }
    }
}
