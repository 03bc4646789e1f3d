//! Collects check reports from every checker runner and delivers them in
//! batches.
//!
//! Runners push reports through a [`CheckIntake`]. The [`CheckAggregator`]
//! wakes on its ceiling interval, on an escalation from any runner, or on a
//! termination signal, and sends whatever has accumulated as one batch.
//! Reports from a failed delivery go back onto the intake and are retried
//! with the next wake, possibly behind newer ones.

use hostpulse_api::MonitoringApi;
use hostpulse_common::types::CheckReport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Builds a connected intake/aggregator pair.
pub fn check_pipeline(
    api: Arc<dyn MonitoringApi>,
    host_id: impl Into<String>,
    ceiling: Duration,
) -> (CheckIntake, CheckAggregator) {
    let (reports_tx, reports) = mpsc::unbounded_channel();
    let (immediate_tx, immediate) = mpsc::channel(1);
    let intake = CheckIntake {
        reports: reports_tx.clone(),
        immediate: immediate_tx,
    };
    let aggregator = CheckAggregator {
        api,
        host_id: host_id.into(),
        ceiling,
        reports,
        requeue: reports_tx,
        immediate,
        immediate_open: true,
    };
    (intake, aggregator)
}

/// Runner-side handle of the check pipeline.
#[derive(Clone)]
pub struct CheckIntake {
    reports: mpsc::UnboundedSender<CheckReport>,
    immediate: mpsc::Sender<()>,
}

impl CheckIntake {
    /// Hands a report to the aggregator. False once it has stopped.
    pub fn forward(&self, report: CheckReport) -> bool {
        self.reports.send(report).is_ok()
    }

    /// Asks the aggregator to deliver now. Requests made while one is already
    /// pending collapse into it.
    pub fn escalate(&self) {
        let _ = self.immediate.try_send(());
    }
}

pub struct CheckAggregator {
    api: Arc<dyn MonitoringApi>,
    host_id: String,
    ceiling: Duration,
    reports: mpsc::UnboundedReceiver<CheckReport>,
    requeue: mpsc::UnboundedSender<CheckReport>,
    immediate: mpsc::Receiver<()>,
    immediate_open: bool,
}

enum Wake {
    Ceiling,
    Immediate,
    Terminate,
}

impl CheckAggregator {
    /// Takes every report buffered right now, without waiting for more.
    pub fn drain(&mut self) -> Vec<CheckReport> {
        let mut drained = Vec::new();
        while let Ok(report) = self.reports.try_recv() {
            drained.push(report);
        }
        drained
    }

    /// Delivers `reports` as one batch. On failure every report is put back
    /// onto the intake.
    pub async fn deliver(&mut self, reports: Vec<CheckReport>) -> bool {
        if reports.is_empty() {
            return true;
        }
        match self.api.report_check_monitors(&self.host_id, &reports).await {
            Ok(()) => {
                tracing::debug!(reports = reports.len(), "Check reports delivered");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, reports = reports.len(), "Failed to report check results");
                for report in reports {
                    // The aggregator holds a sender itself, so the intake cannot be closed here.
                    let _ = self.requeue.send(report);
                }
                false
            }
        }
    }

    /// Delivers on every wake until a termination signal or the termination
    /// channel closes, then drains once more and stops.
    pub async fn run(mut self, mut termination: mpsc::Receiver<()>) {
        loop {
            let wake = self.wait(&mut termination).await;
            let reports = self.drain();
            tracing::debug!(reports = reports.len(), "Check aggregator woke");
            self.deliver(reports).await;
            if matches!(wake, Wake::Terminate) {
                break;
            }
        }
        tracing::debug!("Check aggregator stopped");
    }

    async fn wait(&mut self, termination: &mut mpsc::Receiver<()>) -> Wake {
        let ceiling = tokio::time::sleep(self.ceiling);
        tokio::pin!(ceiling);
        loop {
            tokio::select! {
                _ = &mut ceiling => return Wake::Ceiling,
                signal = self.immediate.recv(), if self.immediate_open => match signal {
                    Some(()) => return Wake::Immediate,
                    None => self.immediate_open = false,
                },
                _ = termination.recv() => return Wake::Terminate,
            }
        }
    }
}

/// Consumes termination signals when no checks are configured, so the
/// coordinator's channel for the check aggregator is always read.
pub async fn discard_terminations(mut termination: mpsc::Receiver<()>) {
    while termination.recv().await.is_some() {
        tracing::debug!("No checks configured, nothing to flush");
    }
}
