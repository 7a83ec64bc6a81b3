//! Start-up wiring for the job system.

use std::sync::Arc;

use actors::{FailurePolicy, JobExecutor, PoolDeps, QueueHandle};
use db::repositories::{JobRepository, QueueRepository};
use db::{Database, DbConfig};
use job_core::{JobEvent, QueueEntry};
use tokio::sync::broadcast;

use crate::JobService;

/// Everything a process needs to submit and run jobs against one store.
pub struct JobSystem {
    pub config: DbConfig,
    pub db: Database,
    pub jobs: JobRepository,
    pub queue_repo: QueueRepository,
    pub queue: QueueHandle,
    pub event_tx: broadcast::Sender<JobEvent>,
    queue_task: tokio::task::JoinHandle<()>,
}

impl JobSystem {
    /// Connect, apply the schema and start the queue actor.
    ///
    /// This should be called once at startup.
    pub async fn init(config: &DbConfig) -> Result<Self, Box<dyn std::error::Error>> {
        tracing::info!("Initializing job system...");

        let db = db::init(config).await?;
        let jobs = JobRepository::open(db.clone()).await?;
        let queue_repo = QueueRepository::open(db.clone()).await?;
        let (queue, queue_task) = QueueHandle::spawn(queue_repo.clone()).await?;
        let (event_tx, _) = broadcast::channel(1024);

        tracing::info!("Job system initialized");

        Ok(Self {
            config: config.clone(),
            db,
            jobs,
            queue_repo,
            queue,
            event_tx,
            queue_task,
        })
    }

    /// Submission API bound to this system.
    pub fn service(&self) -> JobService {
        JobService::new(self.jobs.clone(), self.queue.clone()).with_event_tx(self.event_tx.clone())
    }

    /// Worker pool dependencies bound to this system.
    pub fn pool_deps(
        &self,
        executor: Arc<dyn JobExecutor>,
        policy: Arc<dyn FailurePolicy>,
    ) -> PoolDeps {
        PoolDeps::new(self.jobs.clone(), self.queue.clone(), executor, policy)
            .with_event_tx(self.event_tx.clone())
    }

    /// Queue entries dequeued by an earlier run and never deleted.
    pub async fn stale_claims(&self) -> Result<Vec<QueueEntry>, db::DbError> {
        self.queue_repo.claimed().await
    }

    /// Stop the queue actor and wait for it.
    pub async fn shutdown(self) {
        self.queue.shutdown();
        let _ = self.queue_task.await;
        tracing::info!("Job system stopped");
    }
}
