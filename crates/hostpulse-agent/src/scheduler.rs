//! Post-queue scheduler: decides when queued batches are posted, merged,
//! retried or dropped.
//!
//! A single task owns the [`PostQueue`] consumer and the [`LoopState`].
//! Each cycle takes one batch (plus at most one more if something is already
//! waiting), sleeps for a delay chosen by the current state, posts the
//! merged samples and, on failure, puts every input batch back unless it
//! has used up its retries.

use crate::delay::until_host_slot;
use crate::error::{AgentError, Result};
use crate::queue::PostQueue;
use chrono::Utc;
use hostpulse_api::MonitoringApi;
use hostpulse_common::types::{MetricSample, PostBatch};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Delay between posts while draining after a termination signal.
const TERMINATING_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Nothing posted yet in this run; post right away so the host's graphs
    /// show up early.
    First,
    /// Steady state; post at this host's offset within the base interval.
    Default,
    /// The queue had a backlog when the last cycle started.
    Queued,
    /// The last post failed.
    HadError,
    /// Shutdown requested; drain the queue quickly.
    Terminating,
}

#[derive(Debug, Clone)]
pub struct PostSettings {
    /// Wait in the `Queued` state.
    pub dequeue_delay: Duration,
    /// Wait in the `HadError` state. Fixed, no backoff.
    pub retry_delay: Duration,
    /// A batch failing more than this many times is abandoned.
    pub retry_max: u32,
    /// Base post interval the per-host offset lives in.
    pub post_interval: Duration,
}

/// Result of one post attempt.
#[derive(Debug)]
pub enum PostOutcome {
    /// The samples were accepted; the input batches are returned as they
    /// were at delivery time.
    Delivered(Vec<PostBatch>),
    /// The post failed and the batches were requeued or abandoned.
    Failed { requeued: usize, abandoned: usize },
}

enum Wake {
    Terminate,
    TerminationClosed,
    Batch(Option<PostBatch>),
}

pub struct PostScheduler {
    api: Arc<dyn MonitoringApi>,
    queue: PostQueue,
    settings: PostSettings,
    post_delay: Duration,
    state: LoopState,
    termination_open: bool,
}

impl PostScheduler {
    /// `post_delay` is this host's offset from [`crate::delay::delay_by_host`].
    pub fn new(
        api: Arc<dyn MonitoringApi>,
        queue: PostQueue,
        settings: PostSettings,
        post_delay: Duration,
    ) -> Self {
        Self {
            api,
            queue,
            settings,
            post_delay,
            state: LoopState::First,
            termination_open: true,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn queue_mut(&mut self) -> &mut PostQueue {
        &mut self.queue
    }

    /// Delay to wait before posting in the current state.
    pub fn delay_for_state(&self, now_unix: i64) -> Duration {
        match self.state {
            LoopState::First => Duration::ZERO,
            LoopState::Default => {
                until_host_slot(self.post_delay, self.settings.post_interval, now_unix)
            }
            LoopState::Queued => self.settings.dequeue_delay,
            LoopState::HadError => self.settings.retry_delay,
            LoopState::Terminating => TERMINATING_DELAY,
        }
    }

    /// Records a termination signal. A second one while already draining is
    /// turned into [`AgentError::ForcedTermination`].
    pub fn on_termination(&mut self) -> Result<()> {
        if self.state == LoopState::Terminating {
            tracing::warn!(
                queued = self.queue.len(),
                "Received terminate instruction again, forcing exit"
            );
            return Err(AgentError::ForcedTermination);
        }
        tracing::info!(queued = self.queue.len(), "Draining post queue before exit");
        self.state = LoopState::Terminating;
        Ok(())
    }

    /// Runs until the queue has been drained after a termination signal.
    pub async fn run(mut self, mut termination: mpsc::Receiver<()>) -> Result<()> {
        loop {
            let wake = tokio::select! {
                signal = termination.recv(), if self.termination_open => match signal {
                    Some(()) => Wake::Terminate,
                    None => Wake::TerminationClosed,
                },
                batch = self.queue.recv() => Wake::Batch(batch),
            };

            let first = match wake {
                Wake::Terminate => {
                    self.on_termination()?;
                    if self.queue.is_empty() {
                        return Ok(());
                    }
                    continue;
                }
                Wake::TerminationClosed => {
                    self.termination_open = false;
                    continue;
                }
                Wake::Batch(Some(batch)) => batch,
                Wake::Batch(None) => return Ok(()),
            };

            let batches = self.take_cycle(first);
            let delay = self.delay_for_state(Utc::now().timestamp());
            self.advance_state();

            tracing::debug!(
                delay_secs = delay.as_secs(),
                batches = batches.len(),
                state = ?self.state,
                "Sleeping before posting"
            );
            self.wait(delay, &mut termination).await?;

            if let PostOutcome::Delivered(_) = self.post(batches).await {
                if self.state == LoopState::Terminating && self.queue.is_empty() {
                    tracing::info!("Post queue drained");
                    return Ok(());
                }
            }
        }
    }

    /// Takes `first` plus at most one more already-queued batch.
    fn take_cycle(&mut self, first: PostBatch) -> Vec<PostBatch> {
        let mut batches = vec![first];
        if let Some(next) = self.queue.try_recv() {
            tracing::debug!("Merging datapoints with next queued ones");
            batches.push(next);
        }
        batches
    }

    /// Classifies the next cycle before sleeping, so a batch arriving
    /// during the wait does not change this cycle's decision.
    fn advance_state(&mut self) {
        if self.state != LoopState::Terminating {
            self.state = if self.queue.is_empty() {
                LoopState::Default
            } else {
                LoopState::Queued
            };
        }
    }

    async fn wait(&mut self, delay: Duration, termination: &mut mpsc::Receiver<()>) -> Result<()> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                signal = termination.recv(), if self.termination_open => match signal {
                    Some(()) => return self.on_termination(),
                    None => self.termination_open = false,
                },
            }
        }
    }

    /// Posts the merged samples of `batches` once.
    pub async fn post(&mut self, batches: Vec<PostBatch>) -> PostOutcome {
        let values: Vec<MetricSample> = batches
            .iter()
            .flat_map(|batch| batch.values.iter().cloned())
            .collect();

        match self.api.post_metrics_values(&values).await {
            Ok(()) => {
                tracing::debug!(
                    samples = values.len(),
                    retries = ?batches.iter().map(|b| b.retry_count).collect::<Vec<_>>(),
                    "Posting metrics succeeded"
                );
                PostOutcome::Delivered(batches)
            }
            Err(e) => {
                tracing::error!(error = %e, samples = values.len(), "Failed to post metrics value (will retry)");
                if self.state != LoopState::Terminating {
                    self.state = LoopState::HadError;
                }
                self.requeue_failed(batches)
            }
        }
    }

    fn requeue_failed(&mut self, batches: Vec<PostBatch>) -> PostOutcome {
        let mut requeued = 0;
        let mut abandoned = 0;
        for mut batch in batches {
            batch.record_failure();
            if batch.is_exhausted(self.settings.retry_max) {
                abandoned += 1;
                match serde_json::to_string(&batch.values) {
                    Ok(json) => tracing::error!(
                        retries = batch.retry_count,
                        values = %json,
                        "Post values may be invalid and abandoned"
                    ),
                    Err(e) => tracing::error!(error = %e, "Abandoned post values could not be serialized"),
                }
                continue;
            }
            requeued += 1;
            self.queue.requeue(batch);
        }
        PostOutcome::Failed {
            requeued,
            abandoned,
        }
    }
}
