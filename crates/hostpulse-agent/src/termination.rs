//! Shutdown plumbing shared by the agent's tasks.
//!
//! Two mechanisms cooperate:
//!
//! - [`TerminationFanout`] replicates every external termination signal to
//!   each registered consumer (scheduler, ingestion, spec refresher, check
//!   aggregator). Consumers decide themselves what a signal means: the
//!   scheduler drains, the others stop.
//! - [`QuitSignal`] is raised once the scheduler has finished and stops the
//!   remaining periodic tasks (metric producer, checker runners, the fan-out
//!   itself).
//!
//! [`TaskGroup`] tracks every spawned task so the agent can tell when all of
//! them have exited.

use std::future::Future;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

/// Raises the quit broadcast.
pub struct QuitSignal {
    tx: watch::Sender<bool>,
}

/// Receives the quit broadcast. Cheap to clone, one per task.
#[derive(Clone)]
pub struct QuitListener {
    rx: watch::Receiver<bool>,
}

impl QuitSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn listener(&self) -> QuitListener {
        QuitListener {
            rx: self.tx.subscribe(),
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for QuitSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl QuitListener {
    pub fn is_quit(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once quit has been raised, or the [`QuitSignal`] is gone.
    pub async fn wait(&mut self) {
        // An error means the sender was dropped; nobody can raise quit anymore
        // so treat it the same way.
        let _ = self.rx.wait_for(|quit| *quit).await;
    }
}

/// Delivers each external termination signal to every registered consumer.
#[derive(Default)]
pub struct TerminationFanout {
    consumers: Vec<(String, mpsc::Sender<()>)>,
}

impl TerminationFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer and returns the receiver it listens on.
    pub fn register(&mut self, name: impl Into<String>) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        self.consumers.push((name.into(), tx));
        rx
    }

    /// Hands one signal to every consumer that is still running. Returns the
    /// number of consumers reached.
    ///
    /// Never waits: a consumer that has exited is skipped, and one that has
    /// not yet picked up the previous signal already has one pending.
    pub fn broadcast(&self) -> usize {
        let mut delivered = 0;
        for (name, tx) in &self.consumers {
            match tx.try_send(()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(())) => {
                    tracing::debug!(consumer = %name, "Termination signal already pending");
                    delivered += 1;
                }
                Err(mpsc::error::TrySendError::Closed(())) => {
                    tracing::debug!(consumer = %name, "Consumer already exited, skipping");
                }
            }
        }
        delivered
    }

    /// Forwards signals from `external` until quit is raised. Returning drops
    /// the fan-out, which closes every consumer channel.
    pub async fn run(self, mut external: mpsc::Receiver<()>, mut quit: QuitListener) {
        let mut external_open = true;
        loop {
            tokio::select! {
                signal = external.recv(), if external_open => match signal {
                    Some(()) => {
                        let delivered = self.broadcast();
                        tracing::info!(consumers = delivered, "Termination signal received");
                    }
                    None => external_open = false,
                },
                _ = quit.wait() => break,
            }
        }
    }
}

/// Owns the agent's spawned tasks.
#[derive(Default)]
pub struct TaskGroup {
    tasks: JoinSet<String>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        self.tasks.spawn(async move {
            task.await;
            name
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits until every task has returned, logging each one.
    pub async fn wait_all(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(name) => tracing::debug!(task = %name, "Task exited"),
                Err(e) => tracing::error!(error = %e, "Task failed"),
            }
        }
    }

    /// Aborts every task that is still running.
    pub async fn abort_all(&mut self) {
        self.tasks.shutdown().await;
    }
}
