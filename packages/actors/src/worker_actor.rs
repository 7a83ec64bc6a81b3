//! Worker actor: drives a [`Worker`] in a poll loop.

use std::time::Duration;

use chrono::Utc;
use job_core::JobEvent;
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::WorkerMessage;
use crate::supervisor::RunMode;
use crate::worker::{Iteration, Worker};

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker: Worker,
    pub mode: RunMode,
}

/// State for the worker actor.
pub struct WorkerActorState {
    pub worker: Worker,
    pub mode: RunMode,
    /// Passes completed, idle ones included.
    pub passes: u64,
}

/// Worker actor that executes jobs.
///
/// A failing pass returns its [`WorkerError`](crate::WorkerError) from
/// `handle`, which fails the actor and notifies the supervisor. Stopping the
/// actor lets the current pass finish first.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker.id());

        args.worker.broadcast(JobEvent::WorkerStarted {
            worker_id: args.worker.id().to_string(),
            timestamp: Utc::now(),
        });

        Ok(WorkerActorState {
            worker: args.worker,
            mode: args.mode,
            passes: 0,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        myself.send_message(WorkerMessage::Poll)?;
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                let iteration = state.worker.run_once().await?;
                state.passes += 1;

                match state.mode {
                    RunMode::Once => {
                        myself.stop(Some("single pass complete".to_string()));
                    }
                    RunMode::Forever { poll_interval } => {
                        if iteration == Iteration::Idle {
                            schedule_poll(myself, poll_interval);
                        } else {
                            myself.send_message(WorkerMessage::Poll)?;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            "Worker {} stopped after {} passes",
            state.worker.id(),
            state.passes
        );

        state.worker.broadcast(JobEvent::WorkerStopped {
            worker_id: state.worker.id().to_string(),
            timestamp: Utc::now(),
        });

        Ok(())
    }
}

/// Send the next poll after `delay`; gives up silently once the actor is gone.
fn schedule_poll(myself: ActorRef<WorkerMessage>, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = myself.send_message(WorkerMessage::Poll);
    });
}
