//! Event Stream Transport
//!
//! Batch-oriented event consumption with explicit checkpointing:
//! - Wire event model with partition and offset metadata
//! - Async batch-source and publisher traits
//! - In-process channel transport for tests and replay wiring
//! - MQTT adapter with manual acknowledgements

pub mod channel;
pub mod mqtt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use channel::{channel_transport, ChannelBatchSource, ChannelEventPublisher};
pub use mqtt::{MqttBatchSource, MqttEventPublisher, MqttPublisherConfig, MqttSourceConfig};

/// Transport error types
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Checkpoint failed: {0}")]
    Checkpoint(String),

    #[error("Not subscribed")]
    NotSubscribed,
}

/// One raw message as delivered by the transport.
///
/// The body is left undecoded; payload parsing happens per event so a
/// malformed message cannot take down its batch.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    /// Partition (or topic) the message arrived on.
    pub partition_id: String,
    /// Monotone position within the partition.
    pub offset: i64,
    /// Broker-side enqueue time, when the transport reports one.
    pub enqueued_at: Option<DateTime<Utc>>,
    /// Raw message body.
    pub payload: Vec<u8>,
}

/// A batch of events from a single partition, in delivery order.
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub partition_id: String,
    pub events: Vec<StreamEvent>,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

/// Committed consumer position within a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub partition_id: String,
    pub offset: i64,
}

impl Checkpoint {
    /// Position marker for `event`.
    pub fn of(event: &StreamEvent) -> Self {
        Self {
            partition_id: event.partition_id.clone(),
            offset: event.offset,
        }
    }
}

/// Where a fresh subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Only events published after the subscription was established.
    Latest,
    /// Everything the transport is still able to redeliver.
    Earliest,
}

/// Batch-oriented consumer with checkpoint-based acknowledgement.
///
/// Implementations deliver events of one partition in order and hold
/// redelivery state until [`BatchSource::checkpoint`] commits a position.
#[async_trait]
pub trait BatchSource: Send {
    /// Begin consuming from `start`. Must be called once before
    /// [`BatchSource::next_batch`].
    async fn subscribe(&mut self, start: StartPosition) -> Result<(), StreamError>;

    /// Next batch of events, waiting up to the transport's configured
    /// bound. An empty batch means the wait elapsed without traffic;
    /// `Ok(None)` means the source is closed and will deliver no more.
    async fn next_batch(&mut self) -> Result<Option<EventBatch>, StreamError>;

    /// Commit the position of `event` on its partition. Events at or
    /// before the committed offset are not redelivered.
    async fn checkpoint(&mut self, event: &StreamEvent) -> Result<(), StreamError>;
}

/// Producer side of the transport.
#[async_trait]
pub trait EventPublisher: Send {
    /// Publish one batch of message bodies, preserving order.
    async fn send_batch(&mut self, payloads: Vec<Vec<u8>>) -> Result<(), StreamError>;
}
