use crate::termination::QuitListener;
use chrono::Utc;
use hostpulse_collector::Collector;
use hostpulse_common::types::{MetricsSnapshot, ValueSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Runs every collector once per tick and emits the results as one snapshot.
pub struct MetricsProducer {
    collectors: Vec<Box<dyn Collector>>,
    interval: Duration,
}

impl MetricsProducer {
    pub fn new(collectors: Vec<Box<dyn Collector>>, interval: Duration) -> Self {
        Self {
            collectors,
            interval,
        }
    }

    /// Collects one snapshot. A failing collector is logged and left out.
    pub fn collect_once(&mut self) -> MetricsSnapshot {
        let created = Utc::now();
        let mut values = Vec::with_capacity(self.collectors.len());
        for collector in &mut self.collectors {
            match collector.collect() {
                Ok(collected) => values.push(ValueSet {
                    custom_identifier: collector.custom_identifier().map(str::to_string),
                    values: collected,
                }),
                Err(e) => {
                    tracing::warn!(collector = collector.name(), error = %e, "Collection failed")
                }
            }
        }
        MetricsSnapshot { created, values }
    }

    /// Emits a snapshot every interval, the first one interval after start.
    pub async fn run(mut self, snapshots: mpsc::Sender<MetricsSnapshot>, mut quit: QuitListener) {
        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_secs = self.interval.as_secs(), "Starting metric collection");
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = quit.wait() => break,
            }

            let snapshot = self.collect_once();
            tracing::debug!(sets = snapshot.values.len(), "Collected metrics");

            tokio::select! {
                sent = snapshots.send(snapshot) => if sent.is_err() {
                    tracing::debug!("Ingestion stopped, ending metric collection");
                    break;
                },
                _ = quit.wait() => break,
            }
        }
    }
}
