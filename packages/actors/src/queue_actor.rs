//! Queue actor: the single in-process owner of the FIFO queue.

use std::collections::HashMap;

use db::repositories::QueueRepository;
use job_core::{JobId, QueueEntry};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::{QueueError, QueueMessage};

/// State for the queue actor.
pub struct QueueActorState {
    repo: QueueRepository,
    /// Entry each consumer has dequeued and not yet deleted.
    in_flight: HashMap<String, QueueEntry>,
}

impl QueueActorState {
    pub fn new(repo: QueueRepository) -> Self {
        Self {
            repo,
            in_flight: HashMap::new(),
        }
    }

    async fn get(&mut self, consumer: String) -> Result<Option<QueueEntry>, QueueError> {
        if let Some(held) = self.in_flight.get(&consumer) {
            tracing::warn!(
                "{} dequeued again while still holding position {}",
                consumer,
                held.seq
            );
        }

        let entry = self.repo.get(&consumer).await?;
        if let Some(ref entry) = entry {
            self.in_flight.insert(consumer, entry.clone());
        }

        Ok(entry)
    }

    async fn delete(&mut self, consumer: String) -> Result<QueueEntry, QueueError> {
        let Some(entry) = self.in_flight.remove(&consumer) else {
            return Err(QueueError::NothingInFlight(consumer));
        };

        if let Err(e) = self.repo.delete(entry.seq).await {
            // Keep the claim so the caller can retry the delete.
            self.in_flight.insert(consumer, entry);
            return Err(e.into());
        }

        tracing::debug!("{} released position {}", consumer, entry.seq);

        Ok(entry)
    }
}

/// Queue actor. Its mailbox serialises every queue operation of the process.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueActorState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting queue actor");
        Ok(args)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Insert { job_id, reply } => {
                let result = state.repo.insert(job_id).await.map_err(QueueError::from);
                let _ = reply.send(result);
            }

            QueueMessage::Get { consumer, reply } => {
                let result = state.get(consumer).await;
                let _ = reply.send(result);
            }

            QueueMessage::Delete { consumer, reply } => {
                let result = state.delete(consumer).await;
                let _ = reply.send(result);
            }

            QueueMessage::Len { reply } => {
                let result = state.repo.len().await.map_err(QueueError::from);
                let _ = reply.send(result);
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down queue actor");
                myself.stop(None);
            }
        }

        Ok(())
    }
}

/// Client for the queue actor.
///
/// Cloneable; every clone talks to the same mailbox.
#[derive(Clone)]
pub struct QueueHandle {
    actor: ActorRef<QueueMessage>,
}

impl QueueHandle {
    /// Spawn a queue actor over `repo`.
    pub async fn spawn(
        repo: QueueRepository,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
        let (actor, handle) = Actor::spawn(None, QueueActor, QueueActorState::new(repo)).await?;
        Ok((Self { actor }, handle))
    }

    /// Append a job id at the tail.
    pub async fn insert(&self, job_id: JobId) -> Result<QueueEntry, QueueError> {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.send(QueueMessage::Insert {
            job_id,
            reply: tx.into(),
        })?;
        rx.await.map_err(|_| dropped())?
    }

    /// Dequeue the head entry for `consumer`, or `None` if the queue is empty.
    pub async fn get(&self, consumer: &str) -> Result<Option<QueueEntry>, QueueError> {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.send(QueueMessage::Get {
            consumer: consumer.to_string(),
            reply: tx.into(),
        })?;
        rx.await.map_err(|_| dropped())?
    }

    /// Remove the entry `consumer` dequeued last.
    pub async fn delete(&self, consumer: &str) -> Result<QueueEntry, QueueError> {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.send(QueueMessage::Delete {
            consumer: consumer.to_string(),
            reply: tx.into(),
        })?;
        rx.await.map_err(|_| dropped())?
    }

    pub async fn len(&self) -> Result<usize, QueueError> {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.send(QueueMessage::Len { reply: tx.into() })?;
        rx.await.map_err(|_| dropped())?
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Stop the actor. Pending requests fail with `Unavailable`.
    pub fn shutdown(&self) {
        let _ = self.actor.send_message(QueueMessage::Shutdown);
    }

    fn send(&self, message: QueueMessage) -> Result<(), QueueError> {
        self.actor
            .send_message(message)
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }
}

fn dropped() -> QueueError {
    QueueError::Unavailable("queue actor dropped the request".into())
}
