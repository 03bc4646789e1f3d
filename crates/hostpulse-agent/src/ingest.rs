use crate::queue::PostQueueSender;
use hostpulse_common::types::{Host, MetricSample, MetricsSnapshot, PostBatch};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Turns metric snapshots into post batches and hands them to the post
/// queue.
pub struct Ingestor {
    host_id: String,
    custom_hosts: HashMap<String, Host>,
    queue: PostQueueSender,
}

impl Ingestor {
    /// `custom_hosts` maps custom identifiers to hosts resolved at startup.
    pub fn new(
        host_id: impl Into<String>,
        custom_hosts: HashMap<String, Host>,
        queue: PostQueueSender,
    ) -> Self {
        Self {
            host_id: host_id.into(),
            custom_hosts,
            queue,
        }
    }

    /// Packs one snapshot into a single batch.
    ///
    /// Non-finite values are dropped with a warning. Values whose custom
    /// identifier was never resolved are dropped silently.
    pub fn build_batch(&self, snapshot: &MetricsSnapshot) -> PostBatch {
        let time = snapshot.created.timestamp();
        let mut values = Vec::new();

        for set in &snapshot.values {
            let host_id = match &set.custom_identifier {
                None => self.host_id.as_str(),
                Some(identifier) => match self.custom_hosts.get(identifier) {
                    Some(host) => host.id.as_str(),
                    None => continue,
                },
            };

            let mut names: Vec<&String> = set.values.keys().collect();
            names.sort();
            for name in names {
                let value = set.values[name];
                if !value.is_finite() {
                    tracing::warn!(metric = %name, value = %value, "Invalid value, dropping");
                    continue;
                }
                values.push(MetricSample {
                    host_id: host_id.to_string(),
                    name: name.clone(),
                    time,
                    value,
                });
            }
        }

        PostBatch::new(values)
    }

    /// Runs until a termination signal arrives, the termination channel is
    /// closed or the producer goes away.
    ///
    /// Handing a batch to a full queue waits for room; a termination signal
    /// received while waiting abandons that batch.
    pub async fn run(
        self,
        mut snapshots: mpsc::Receiver<MetricsSnapshot>,
        mut termination: mpsc::Receiver<()>,
    ) {
        loop {
            let snapshot = tokio::select! {
                _ = termination.recv() => break,
                snapshot = snapshots.recv() => match snapshot {
                    Some(snapshot) => snapshot,
                    None => break,
                },
            };

            let batch = self.build_batch(&snapshot);
            if batch.is_empty() {
                tracing::debug!("Snapshot produced no values to post");
                continue;
            }
            tracing::debug!(samples = batch.len(), queued = self.queue.queued(), "Enqueuing batch");

            tokio::select! {
                sent = self.queue.send(batch) => if sent.is_err() {
                    tracing::warn!("Post queue closed, stopping ingestion");
                    break;
                },
                _ = termination.recv() => {
                    tracing::warn!("Terminating while the post queue is full, dropping the pending batch");
                    break;
                }
            }
        }
        tracing::debug!("Metric ingestion stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::post_queue;
    use chrono::{TimeZone, Utc};
    use hostpulse_common::types::ValueSet;

    fn host(id: &str) -> Host {
        Host {
            id: id.into(),
            name: id.into(),
            status: "working".into(),
            custom_identifier: None,
        }
    }

    fn snapshot(sets: Vec<ValueSet>) -> MetricsSnapshot {
        MetricsSnapshot {
            created: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            values: sets,
        }
    }

    fn set(custom_identifier: Option<&str>, values: &[(&str, f64)]) -> ValueSet {
        ValueSet {
            custom_identifier: custom_identifier.map(str::to_string),
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn attaches_primary_and_custom_hosts() {
        let (tx, _queue) = post_queue(4);
        let custom = HashMap::from([("db.example".to_string(), host("custom-1"))]);
        let ingestor = Ingestor::new("main-1", custom, tx);

        let batch = ingestor.build_batch(&snapshot(vec![
            set(None, &[("loadavg5", 0.3), ("loadavg1", 0.5)]),
            set(Some("db.example"), &[("mysql.connections", 12.0)]),
            set(Some("unknown.example"), &[("dropped", 1.0)]),
        ]));

        assert_eq!(batch.retry_count, 0);
        let got: Vec<(&str, &str, i64)> = batch
            .values
            .iter()
            .map(|s| (s.host_id.as_str(), s.name.as_str(), s.time))
            .collect();
        assert_eq!(
            got,
            vec![
                ("main-1", "loadavg1", 1_700_000_000),
                ("main-1", "loadavg5", 1_700_000_000),
                ("custom-1", "mysql.connections", 1_700_000_000),
            ]
        );
    }

    #[test]
    fn drops_non_finite_values() {
        let (tx, _queue) = post_queue(4);
        let ingestor = Ingestor::new("main-1", HashMap::new(), tx);
        let batch = ingestor.build_batch(&snapshot(vec![set(
            None,
            &[
                ("a", f64::NAN),
                ("b", f64::INFINITY),
                ("c", f64::NEG_INFINITY),
                ("d", 1.5),
            ],
        )]));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.values[0].name, "d");
    }

    #[tokio::test]
    async fn run_enqueues_until_terminated() {
        let (tx, mut queue) = post_queue(4);
        let (snap_tx, snap_rx) = mpsc::channel(1);
        let (term_tx, term_rx) = mpsc::channel(1);
        let handle = tokio::spawn(Ingestor::new("main-1", HashMap::new(), tx).run(snap_rx, term_rx));

        snap_tx.send(snapshot(vec![set(None, &[("x", 1.0)])])).await.unwrap();
        snap_tx.send(snapshot(vec![set(None, &[("y", f64::NAN)])])).await.unwrap();
        snap_tx.send(snapshot(vec![set(None, &[("z", 2.0)])])).await.unwrap();

        assert_eq!(queue.recv().await.unwrap().values[0].name, "x");
        assert_eq!(queue.recv().await.unwrap().values[0].name, "z");

        term_tx.send(()).await.unwrap();
        handle.await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn termination_unblocks_a_full_queue() {
        let (tx, _queue) = post_queue(1);
        let (snap_tx, snap_rx) = mpsc::channel(1);
        let (term_tx, term_rx) = mpsc::channel(1);
        let handle = tokio::spawn(Ingestor::new("main-1", HashMap::new(), tx).run(snap_rx, term_rx));

        snap_tx.send(snapshot(vec![set(None, &[("a", 1.0)])])).await.unwrap();
        snap_tx.send(snapshot(vec![set(None, &[("b", 1.0)])])).await.unwrap();
        tokio::task::yield_now().await;

        term_tx.send(()).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
