//! Supervisor actor: owns the worker pool and decides how it ends.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use db::repositories::JobRepository;
use job_core::JobEvent;
use ractor::concurrency::{OneshotReceiver, OneshotSender};
use ractor::{Actor, ActorCell, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;

use crate::executor::{FailurePolicy, JobExecutor};
use crate::messages::SupervisorMessage;
use crate::queue_actor::QueueHandle;
use crate::worker::Worker;
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// How workers keep polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Poll until shut down, sleeping `poll_interval` whenever the queue is
    /// empty.
    Forever { poll_interval: Duration },
    /// Each worker makes exactly one pass, then the pool stops.
    Once,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Forever {
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    pub mode: RunMode,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            mode: RunMode::default(),
        }
    }
}

impl PoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Single-pass configuration.
    pub fn once(workers: usize) -> Self {
        Self {
            workers,
            mode: RunMode::Once,
        }
    }
}

/// What every worker in the pool shares.
#[derive(Clone)]
pub struct PoolDeps {
    pub jobs: JobRepository,
    pub queue: QueueHandle,
    pub executor: Arc<dyn JobExecutor>,
    pub policy: Arc<dyn FailurePolicy>,
    pub event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl PoolDeps {
    pub fn new(
        jobs: JobRepository,
        queue: QueueHandle,
        executor: Arc<dyn JobExecutor>,
        policy: Arc<dyn FailurePolicy>,
    ) -> Self {
        Self {
            jobs,
            queue,
            executor,
            policy,
            event_tx: None,
        }
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn worker(&self, worker_id: String) -> Worker {
        let worker = Worker::new(
            worker_id,
            self.jobs.clone(),
            self.queue.clone(),
            self.executor.clone(),
            self.policy.clone(),
        );
        match &self.event_tx {
            Some(tx) => worker.with_event_tx(tx.clone()),
            None => worker,
        }
    }
}

/// How the pool ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolExit {
    /// Every worker finished its single pass.
    Completed,
    /// Stopped on request.
    ShutDown,
    /// A worker hit a systemic error; the rest were stopped.
    WorkerFailed { worker_id: String, error: String },
}

impl PoolExit {
    pub fn description(&self) -> String {
        match self {
            PoolExit::Completed => "all workers completed".to_string(),
            PoolExit::ShutDown => "shut down".to_string(),
            PoolExit::WorkerFailed { worker_id, error } => {
                format!("{} failed: {}", worker_id, error)
            }
        }
    }
}

/// Supervisor actor arguments.
pub struct SupervisorArgs {
    pub config: PoolConfig,
    pub deps: PoolDeps,
    pub exit_tx: OneshotSender<PoolExit>,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    /// Live workers by actor id.
    workers: HashMap<ActorId, (String, ActorCell)>,
    /// Set once the first worker fails.
    failure: Option<PoolExit>,
    shutting_down: bool,
    exit_tx: Option<OneshotSender<PoolExit>>,
    event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl SupervisorState {
    fn exit(&self) -> PoolExit {
        match &self.failure {
            Some(failure) => failure.clone(),
            None if self.shutting_down => PoolExit::ShutDown,
            None => PoolExit::Completed,
        }
    }

    fn stop_workers(&self, reason: &str) {
        for (_, cell) in self.workers.values() {
            cell.stop(Some(reason.to_string()));
        }
    }

    /// Forget a stopped worker; stop the supervisor when none are left.
    fn release(&mut self, myself: &ActorRef<SupervisorMessage>, id: ActorId) {
        self.workers.remove(&id);
        if self.workers.is_empty() {
            myself.stop(Some(self.exit().description()));
        }
    }
}

/// Supervisor actor that manages the worker pool.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting worker pool: {} workers, {:?}",
            args.config.workers,
            args.config.mode
        );

        let mut workers = HashMap::new();
        for n in 1..=args.config.workers {
            let worker_id = format!("worker-{}", n);
            let worker_args = WorkerArgs {
                worker: args.deps.worker(worker_id.clone()),
                mode: args.config.mode,
            };

            let (actor, _handle) =
                Actor::spawn_linked(None, WorkerActor, worker_args, myself.get_cell())
                    .await
                    .map_err(|e| {
                        ActorProcessingErr::from(format!("Failed to spawn {}: {}", worker_id, e))
                    })?;

            workers.insert(actor.get_id(), (worker_id, actor.get_cell()));
        }

        Ok(SupervisorState {
            workers,
            failure: None,
            shutting_down: false,
            exit_tx: Some(args.exit_tx),
            event_tx: args.deps.event_tx,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if state.workers.is_empty() {
            myself.stop(Some(state.exit().description()));
        }
        Ok(())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down worker pool");
                state.shutting_down = true;
                state.stop_workers("pool shutdown");
            }

            SupervisorMessage::LiveWorkers { reply } => {
                let _ = reply.send(state.workers.len());
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                if let Some((worker_id, _)) = state.workers.get(&cell.get_id()) {
                    tracing::debug!("{} terminated: {:?}", worker_id, reason);
                }
                state.release(&myself, cell.get_id());
            }

            SupervisionEvent::ActorFailed(cell, error) => {
                let worker_id = state
                    .workers
                    .get(&cell.get_id())
                    .map(|(id, _)| id.clone())
                    .unwrap_or_else(|| cell.get_id().to_string());

                tracing::error!("{} failed: {}", worker_id, error);

                if state.failure.is_none() {
                    state.failure = Some(PoolExit::WorkerFailed {
                        worker_id,
                        error: error.to_string(),
                    });
                    state.stop_workers("another worker failed");
                }

                state.release(&myself, cell.get_id());
            }

            _ => {}
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let exit = state.exit();
        tracing::info!("Worker pool stopped: {}", exit.description());

        if let Some(ref tx) = state.event_tx {
            let _ = tx.send(JobEvent::PoolStopped {
                reason: exit.description(),
                timestamp: Utc::now(),
            });
        }

        if let Some(tx) = state.exit_tx.take() {
            let _ = tx.send(exit);
        }

        Ok(())
    }
}

/// A running worker pool.
pub struct PoolHandle {
    supervisor: ActorRef<SupervisorMessage>,
    exit_rx: OneshotReceiver<PoolExit>,
    join: tokio::task::JoinHandle<()>,
}

impl PoolHandle {
    /// Ask every worker to stop once its current pass is over.
    ///
    /// Running processes are never interrupted.
    pub fn shutdown(&self) {
        let _ = self.supervisor.send_message(SupervisorMessage::Shutdown);
    }

    /// The supervisor actor, for stopping the pool from another task.
    pub fn supervisor(&self) -> &ActorRef<SupervisorMessage> {
        &self.supervisor
    }

    /// Number of workers still running.
    pub async fn live_workers(&self) -> usize {
        let (tx, rx) = ractor::concurrency::oneshot();
        if self
            .supervisor
            .send_message(SupervisorMessage::LiveWorkers { reply: tx.into() })
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Wait for the pool to stop.
    pub async fn wait(self) -> PoolExit {
        let exit = self.exit_rx.await.unwrap_or(PoolExit::ShutDown);
        let _ = self.join.await;
        exit
    }
}

/// Start a worker pool.
pub async fn start_pool(config: PoolConfig, deps: PoolDeps) -> Result<PoolHandle, ractor::SpawnErr> {
    let (exit_tx, exit_rx) = ractor::concurrency::oneshot();
    let args = SupervisorArgs {
        config,
        deps,
        exit_tx,
    };

    let (supervisor, join) = Actor::spawn(None, Supervisor, args).await?;

    Ok(PoolHandle {
        supervisor,
        exit_rx,
        join,
    })
}
