//! In-process channel transport.
//!
//! Wires a publisher and a source over a tokio mpsc channel. Used by the
//! service tests and by local replay runs that skip the broker.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    BatchSource, Checkpoint, EventBatch, EventPublisher, StartPosition, StreamError, StreamEvent,
};

const CHANNEL_PARTITION: &str = "channel-0";

/// Create a connected publisher/source pair.
///
/// `capacity` bounds the number of in-flight batches.
pub fn channel_transport(capacity: usize) -> (ChannelEventPublisher, ChannelBatchSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ChannelEventPublisher { tx },
        ChannelBatchSource {
            rx,
            next_offset: 0,
            recv_wait: Duration::from_millis(500),
            committed: Arc::new(Mutex::new(Vec::new())),
        },
    )
}

/// Publishing half of the in-process transport.
#[derive(Clone)]
pub struct ChannelEventPublisher {
    tx: mpsc::Sender<Vec<Vec<u8>>>,
}

#[async_trait]
impl EventPublisher for ChannelEventPublisher {
    async fn send_batch(&mut self, payloads: Vec<Vec<u8>>) -> Result<(), StreamError> {
        self.tx
            .send(payloads)
            .await
            .map_err(|e| StreamError::Publish(e.to_string()))
    }
}

/// Consuming half of the in-process transport.
///
/// Offsets are assigned on receipt, monotone over the life of the source.
/// Committed checkpoints are recorded and can be inspected through
/// [`ChannelBatchSource::checkpoint_log`].
pub struct ChannelBatchSource {
    rx: mpsc::Receiver<Vec<Vec<u8>>>,
    next_offset: i64,
    recv_wait: Duration,
    committed: Arc<Mutex<Vec<Checkpoint>>>,
}

impl ChannelBatchSource {
    /// Override the bounded receive wait (default 500 ms).
    pub fn with_recv_wait(mut self, wait: Duration) -> Self {
        self.recv_wait = wait;
        self
    }

    /// Shared handle onto the committed-checkpoint record.
    pub fn checkpoint_log(&self) -> Arc<Mutex<Vec<Checkpoint>>> {
        Arc::clone(&self.committed)
    }
}

#[async_trait]
impl BatchSource for ChannelBatchSource {
    async fn subscribe(&mut self, start: StartPosition) -> Result<(), StreamError> {
        // The channel has no retained history; either position delivers
        // whatever is queued from here on.
        debug!(?start, "channel source subscribed");
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<EventBatch>, StreamError> {
        let events = match tokio::time::timeout(self.recv_wait, self.rx.recv()).await {
            Ok(Some(payloads)) => payloads
                .into_iter()
                .map(|payload| {
                    let offset = self.next_offset;
                    self.next_offset += 1;
                    StreamEvent {
                        partition_id: CHANNEL_PARTITION.to_string(),
                        offset,
                        enqueued_at: Some(Utc::now()),
                        payload,
                    }
                })
                .collect(),
            Ok(None) => return Ok(None),
            Err(_) => Vec::new(),
        };

        Ok(Some(EventBatch {
            partition_id: CHANNEL_PARTITION.to_string(),
            events,
        }))
    }

    async fn checkpoint(&mut self, event: &StreamEvent) -> Result<(), StreamError> {
        let mut committed = self
            .committed
            .lock()
            .map_err(|_| StreamError::Checkpoint("checkpoint log poisoned".to_string()))?;
        committed.push(Checkpoint::of(event));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_batches_arrive_in_order_with_monotone_offsets() {
        let (mut publisher, mut source) = channel_transport(8);
        source.subscribe(StartPosition::Latest).await.unwrap();

        publisher
            .send_batch(vec![b"a".to_vec(), b"b".to_vec()])
            .await
            .unwrap();
        publisher.send_batch(vec![b"c".to_vec()]).await.unwrap();
        drop(publisher);

        let first = source.next_batch().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.events[0].offset, 0);
        assert_eq!(first.events[1].offset, 1);
        assert_eq!(first.events[0].payload, b"a");

        let second = source.next_batch().await.unwrap().unwrap();
        assert_eq!(second.events[0].offset, 2);

        assert!(source.next_batch().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_wait_elapses_to_empty_batch() {
        let (_publisher, mut source) = channel_transport(1);
        source.subscribe(StartPosition::Latest).await.unwrap();

        let batch = source.next_batch().await.unwrap().unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_checkpoint_records_committed_position() {
        let (mut publisher, mut source) = channel_transport(4);
        source.subscribe(StartPosition::Latest).await.unwrap();
        let log = source.checkpoint_log();

        publisher
            .send_batch(vec![b"x".to_vec(), b"y".to_vec()])
            .await
            .unwrap();

        let batch = source.next_batch().await.unwrap().unwrap();
        let last = batch.events.last().unwrap();
        source.checkpoint(last).await.unwrap();

        let committed = log.lock().unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(
            committed[0],
            Checkpoint {
                partition_id: "channel-0".to_string(),
                offset: 1,
            }
        );
    }
}
