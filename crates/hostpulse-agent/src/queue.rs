//! Bounded post queue between the ingestion loop and the scheduler.
//!
//! The queue is the only backpressure point of the metric pipeline: once it
//! holds `capacity` batches, [`PostQueueSender::send`] waits until the
//! scheduler takes one out.

use hostpulse_common::types::PostBatch;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendError, TryRecvError, TrySendError};

/// Creates a post queue holding at most `capacity` batches from producers.
pub fn post_queue(capacity: usize) -> (PostQueueSender, PostQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let queue = PostQueue {
        rx,
        requeue: tx.clone(),
        overflow: VecDeque::new(),
    };
    (PostQueueSender { tx }, queue)
}

/// Producer side of the post queue.
#[derive(Clone)]
pub struct PostQueueSender {
    tx: mpsc::Sender<PostBatch>,
}

impl PostQueueSender {
    /// Enqueues a batch, waiting while the queue is full.
    pub async fn send(&self, batch: PostBatch) -> Result<(), SendError<PostBatch>> {
        self.tx.send(batch).await
    }

    /// Number of batches currently buffered in the channel.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Consumer side of the post queue, owned by the scheduler.
///
/// Batches put back after a failed delivery go to the end of the channel
/// when there is room. When producers have filled it in the meantime they
/// wait in a local overflow list instead, so requeueing never blocks the
/// scheduler on its own queue.
pub struct PostQueue {
    rx: mpsc::Receiver<PostBatch>,
    requeue: mpsc::Sender<PostBatch>,
    overflow: VecDeque<PostBatch>,
}

impl PostQueue {
    pub fn len(&self) -> usize {
        self.rx.len() + self.overflow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes the next batch, waiting for one if the queue is empty.
    ///
    /// Cancel safe: dropping the future before it completes loses nothing.
    pub async fn recv(&mut self) -> Option<PostBatch> {
        if let Some(batch) = self.try_recv() {
            return Some(batch);
        }
        self.rx.recv().await
    }

    /// Takes the next batch if one is already queued.
    pub fn try_recv(&mut self) -> Option<PostBatch> {
        match self.rx.try_recv() {
            Ok(batch) => Some(batch),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => self.overflow.pop_front(),
        }
    }

    /// Puts a batch back at the end of the queue without waiting.
    pub fn requeue(&mut self, batch: PostBatch) {
        match self.requeue.try_send(batch) {
            Ok(()) => {}
            Err(TrySendError::Full(batch) | TrySendError::Closed(batch)) => {
                tracing::debug!(
                    overflow = self.overflow.len() + 1,
                    "Post queue full, holding requeued batch aside"
                );
                self.overflow.push_back(batch);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostpulse_common::types::MetricSample;
    use std::time::Duration;

    fn batch(name: &str) -> PostBatch {
        PostBatch::new(vec![MetricSample {
            host_id: "h1".into(),
            name: name.into(),
            time: 0,
            value: 1.0,
        }])
    }

    #[tokio::test]
    async fn third_send_waits_for_a_free_slot() {
        let (tx, mut queue) = post_queue(2);
        tx.send(batch("a")).await.unwrap();
        tx.send(batch("b")).await.unwrap();
        assert_eq!(queue.len(), 2);

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(batch("c"))).await;
        assert!(blocked.is_err(), "third send should wait while the queue is full");

        let sender = tx.clone();
        let pending = tokio::spawn(async move { sender.send(batch("c")).await });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        assert_eq!(queue.recv().await.unwrap().values[0].name, "a");
        pending.await.unwrap().unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn requeue_overflows_when_full() {
        let (tx, mut queue) = post_queue(1);
        tx.send(batch("a")).await.unwrap();
        queue.requeue(batch("retry"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_recv().unwrap().values[0].name, "a");
        assert_eq!(queue.try_recv().unwrap().values[0].name, "retry");
        assert!(queue.try_recv().is_none());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn requeued_batch_goes_behind_queued_ones() {
        let (tx, mut queue) = post_queue(4);
        tx.send(batch("a")).await.unwrap();
        queue.requeue(batch("retry"));
        assert_eq!(queue.recv().await.unwrap().values[0].name, "a");
        assert_eq!(queue.recv().await.unwrap().values[0].name, "retry");
    }
}
