//! Bounded webhook dispatch
//!
//! The transport hands verified events to a [`WebhookDispatcher`] instead of
//! running the pipeline inline. Events wait in a bounded queue and run on
//! their own tasks, at most `workers` at a time. Each submission returns a
//! [`PendingOutcome`] the caller can await, and every completion is also
//! broadcast so tests and metrics can observe outcomes without sleeping.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::SyncError;
use crate::events::WebhookEvent;
use crate::webhooks::{ProcessingOutcome, WebhookHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Events processed concurrently
    pub workers: usize,
    /// Events accepted but not yet started
    pub queue_depth: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_depth: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Webhook queue is full")]
    QueueFull,

    #[error("Webhook dispatcher is shutting down")]
    ShuttingDown,
}

/// Broadcast after each event finishes
#[derive(Debug, Clone)]
pub struct CompletedEvent {
    pub event_id: String,
    pub event_type: String,
    pub outcome: ProcessingOutcome,
}

struct Job {
    event: WebhookEvent,
    reply: oneshot::Sender<ProcessingOutcome>,
}

/// Outcome of a submitted event, resolved once a worker finishes it
#[derive(Debug)]
pub struct PendingOutcome {
    event_id: String,
    receiver: oneshot::Receiver<ProcessingOutcome>,
}

impl PendingOutcome {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub async fn wait(self) -> ProcessingOutcome {
        self.receiver.await.unwrap_or_else(|_| {
            ProcessingOutcome::Failed(SyncError::Internal(format!(
                "worker for event {} exited without an outcome",
                self.event_id
            )))
        })
    }
}

pub struct WebhookDispatcher {
    sender: mpsc::Sender<Job>,
    completions: broadcast::Sender<CompletedEvent>,
    shutdown: CancellationToken,
    run_loop: Mutex<Option<JoinHandle<()>>>,
}

impl WebhookDispatcher {
    /// Spawn the dispatch loop. Must be called inside a tokio runtime.
    pub fn start(handler: Arc<WebhookHandler>, config: DispatcherConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_depth.max(1));
        let (completions, _) = broadcast::channel(config.queue_depth.max(16));
        let shutdown = CancellationToken::new();

        let run_loop = tokio::spawn(run_dispatch_loop(
            handler,
            receiver,
            Arc::new(Semaphore::new(config.workers.max(1))),
            completions.clone(),
            shutdown.clone(),
        ));

        tracing::info!(
            workers = config.workers,
            queue_depth = config.queue_depth,
            "Webhook dispatcher started"
        );

        Self {
            sender,
            completions,
            shutdown,
            run_loop: Mutex::new(Some(run_loop)),
        }
    }

    /// Queue an event without waiting for room
    pub fn submit(&self, event: WebhookEvent) -> Result<PendingOutcome, DispatchError> {
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::ShuttingDown);
        }

        let event_id = event.id.clone();
        let (reply, receiver) = oneshot::channel();

        self.sender
            .try_send(Job { event, reply })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!(event_id = %event_id, "Webhook queue full - rejecting event");
                    DispatchError::QueueFull
                }
                mpsc::error::TrySendError::Closed(_) => DispatchError::ShuttingDown,
            })?;

        Ok(PendingOutcome { event_id, receiver })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompletedEvent> {
        self.completions.subscribe()
    }

    /// Stop accepting events, finish everything already queued or running
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        if let Some(handle) = self.run_loop.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Webhook dispatch loop panicked");
            }
        }

        tracing::info!("Webhook dispatcher stopped");
    }
}

async fn run_dispatch_loop(
    handler: Arc<WebhookHandler>,
    mut receiver: mpsc::Receiver<Job>,
    workers: Arc<Semaphore>,
    completions: broadcast::Sender<CompletedEvent>,
    shutdown: CancellationToken,
) {
    let tracker = TaskTracker::new();

    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        spawn_job(&tracker, &handler, &workers, &completions, job).await;
    }

    // Drain what was accepted before intake closed
    receiver.close();
    while let Some(job) = receiver.recv().await {
        spawn_job(&tracker, &handler, &workers, &completions, job).await;
    }

    tracker.close();
    tracker.wait().await;
}

async fn spawn_job(
    tracker: &TaskTracker,
    handler: &Arc<WebhookHandler>,
    workers: &Arc<Semaphore>,
    completions: &broadcast::Sender<CompletedEvent>,
    job: Job,
) {
    let Ok(permit) = Arc::clone(workers).acquire_owned().await else {
        tracing::error!(event_id = %job.event.id, "Worker pool closed - dropping event");
        return;
    };

    let handler = Arc::clone(handler);
    let completions = completions.clone();

    tracker.spawn(async move {
        let _permit = permit;
        let Job { event, reply } = job;
        let event_id = event.id.clone();
        let event_type = event.event_type.clone();

        let outcome = handler.handle_event(event).await;

        // No subscribers is fine
        let _ = completions.send(CompletedEvent {
            event_id,
            event_type,
            outcome: outcome.clone(),
        });
        let _ = reply.send(outcome);
    });
}
