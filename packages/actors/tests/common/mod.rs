#![allow(dead_code)]

use std::sync::Arc;

use actors::{
    ExecError, ExecFuture, FnExecutor, JobExecutor, MarkerPolicy, PoolDeps, ProcessExecutor,
    ProcessOutput, QueueHandle, Worker,
};
use db::repositories::{JobRepository, QueueRepository};
use db::{Database, DbConfig, DbError};
use job_core::{CommandBuilder, JobId, NewJob};
use serde_json::{Map, Value};

pub struct Harness {
    pub db: Database,
    pub jobs: JobRepository,
    pub queue_repo: QueueRepository,
    pub queue: QueueHandle,
}

/// Fresh in-memory store plus a queue actor over it.
pub async fn setup() -> Result<Harness, Box<dyn std::error::Error>> {
    let db = db::init(&DbConfig::memory()).await?;
    let jobs = JobRepository::open(db.clone()).await?;
    let queue_repo = QueueRepository::open(db.clone()).await?;
    let (queue, _) = QueueHandle::spawn(queue_repo.clone()).await?;

    Ok(Harness {
        db,
        jobs,
        queue_repo,
        queue,
    })
}

impl Harness {
    /// Store a queued job and enqueue it, the way submission does.
    pub async fn submit(
        &self,
        pairs: &[(&str, &str)],
        resource: &str,
        action: &str,
    ) -> Result<JobId, Box<dyn std::error::Error>> {
        let mut payload = Map::new();
        for (k, v) in pairs {
            payload.insert(k.to_string(), Value::String(v.to_string()));
        }
        let id = self
            .jobs
            .insert(&NewJob::new(&payload, resource, action)?)
            .await?;
        self.queue.insert(id).await?;
        Ok(id)
    }

    pub fn worker(&self, id: &str, executor: Arc<dyn JobExecutor>) -> Worker {
        Worker::new(
            id,
            self.jobs.clone(),
            self.queue.clone(),
            executor,
            Arc::new(MarkerPolicy::default()),
        )
    }

    pub fn deps(&self, executor: Arc<dyn JobExecutor>) -> PoolDeps {
        PoolDeps::new(
            self.jobs.clone(),
            self.queue.clone(),
            executor,
            Arc::new(MarkerPolicy::default()),
        )
    }

    pub async fn queue_len(&self) -> Result<usize, DbError> {
        self.queue_repo.len().await
    }
}

/// Executor that returns canned output without spawning anything.
pub fn canned(exit_code: i32, stdout: &str, stderr: &str) -> Arc<dyn JobExecutor> {
    let output = ProcessOutput {
        exit_code: Some(exit_code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    };
    Arc::new(FnExecutor::new(move |_job| -> ExecFuture {
        let output = output.clone();
        Box::pin(async move { Ok::<_, ExecError>(output) })
    }))
}

/// An installation directory whose `python` launcher is a shell script.
///
/// The script receives the usual arguments (`<dir>/dlab resource action
/// --key=value...`) and appends them to `calls.log` before running `body`.
#[cfg(unix)]
pub fn fake_install(body: &str) -> std::io::Result<tempfile::TempDir> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir()?;
    let launcher = dir.path().join(job_core::LAUNCHER);
    let script = format!(
        "#!/bin/sh\necho \"$@\" >> \"$(dirname \"$0\")/calls.log\"\n{}\n",
        body
    );
    std::fs::write(&launcher, script)?;
    std::fs::set_permissions(&launcher, std::fs::Permissions::from_mode(0o755))?;
    std::fs::write(dir.path().join(job_core::ENTRYPOINT), "")?;

    Ok(dir)
}

#[cfg(unix)]
pub fn process_executor(dir: &tempfile::TempDir) -> Arc<dyn JobExecutor> {
    Arc::new(ProcessExecutor::new(CommandBuilder::new(dir.path())))
}

#[cfg(unix)]
pub fn calls(dir: &tempfile::TempDir) -> Vec<String> {
    std::fs::read_to_string(dir.path().join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
