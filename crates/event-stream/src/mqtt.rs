//! MQTT transport adapter.
//!
//! Consumes with manual acknowledgements so checkpointing stays in the
//! pipeline's hands: deliveries are held unacked until a checkpoint
//! commits their offset. Offsets are assigned locally in arrival order;
//! the subscribed topic doubles as the partition id.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, Publish, QoS};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    BatchSource, EventBatch, EventPublisher, StartPosition, StreamError, StreamEvent,
};

/// Consumer configuration
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    /// MQTT broker host
    pub broker_host: String,
    /// MQTT port
    pub broker_port: u16,
    /// Client identifier presented to the broker
    pub client_id: String,
    /// Topic to subscribe
    pub topic: String,
    /// Upper bound on events per batch
    pub max_batch_size: usize,
    /// Bounded wait before an incomplete batch is handed out
    pub batch_wait: Duration,
}

impl Default for MqttSourceConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "vibro-scorer".to_string(),
            topic: "sensors/vibration".to_string(),
            max_batch_size: 100,
            batch_wait: Duration::from_secs(2),
        }
    }
}

/// Groups individual deliveries into bounded batches.
struct BatchAssembler {
    max_batch_size: usize,
    batch_wait: Duration,
}

impl BatchAssembler {
    /// Collect up to `max_batch_size` publishes, waiting at most
    /// `batch_wait` overall. `None` means the feed is closed and drained.
    async fn collect(&self, rx: &mut mpsc::Receiver<Publish>) -> Option<Vec<Publish>> {
        let deadline = tokio::time::Instant::now() + self.batch_wait;
        let mut publishes = Vec::new();

        while publishes.len() < self.max_batch_size {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(publish)) => publishes.push(publish),
                Ok(None) => {
                    if publishes.is_empty() {
                        return None;
                    }
                    break;
                }
                Err(_) => break,
            }
        }

        Some(publishes)
    }
}

/// MQTT batch consumer with deferred acknowledgement.
pub struct MqttBatchSource {
    config: MqttSourceConfig,
    client: Option<AsyncClient>,
    inbox: Option<mpsc::Receiver<Publish>>,
    assembler: BatchAssembler,
    /// Delivered but not yet acked, oldest first.
    pending: VecDeque<(i64, Publish)>,
    next_offset: i64,
}

impl MqttBatchSource {
    pub fn new(config: MqttSourceConfig) -> Self {
        let assembler = BatchAssembler {
            max_batch_size: config.max_batch_size,
            batch_wait: config.batch_wait,
        };
        Self {
            config,
            client: None,
            inbox: None,
            assembler,
            pending: VecDeque::new(),
            next_offset: 0,
        }
    }

    /// Unacked deliveries currently held.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl BatchSource for MqttBatchSource {
    async fn subscribe(&mut self, start: StartPosition) -> Result<(), StreamError> {
        if start == StartPosition::Earliest {
            warn!("MQTT retains no history; subscription starts at live traffic");
        }

        let mut options = MqttOptions::new(
            &self.config.client_id,
            &self.config.broker_host,
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);
        options.set_manual_acks(true);

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let (tx, rx) = mpsc::channel(self.config.max_batch_size.max(1) * 2);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if tx.send(publish).await.is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(incoming)) => {
                        debug!("MQTT incoming: {:?}", incoming);
                    }
                    Err(e) => {
                        error!("MQTT error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    _ => {}
                }
            }
        });

        client
            .subscribe(&self.config.topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| StreamError::Subscribe(e.to_string()))?;

        info!(
            broker = %self.config.broker_host,
            topic = %self.config.topic,
            "subscribed to MQTT event stream"
        );

        self.client = Some(client);
        self.inbox = Some(rx);
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<EventBatch>, StreamError> {
        let inbox = self.inbox.as_mut().ok_or(StreamError::NotSubscribed)?;

        let publishes = match self.assembler.collect(inbox).await {
            Some(publishes) => publishes,
            None => return Ok(None),
        };

        let events = publishes
            .into_iter()
            .map(|publish| {
                let offset = self.next_offset;
                self.next_offset += 1;
                let event = StreamEvent {
                    partition_id: self.config.topic.clone(),
                    offset,
                    enqueued_at: Some(Utc::now()),
                    payload: publish.payload.to_vec(),
                };
                self.pending.push_back((offset, publish));
                event
            })
            .collect();

        Ok(Some(EventBatch {
            partition_id: self.config.topic.clone(),
            events,
        }))
    }

    async fn checkpoint(&mut self, event: &StreamEvent) -> Result<(), StreamError> {
        let client = self.client.as_ref().ok_or(StreamError::NotSubscribed)?;

        while let Some((offset, _)) = self.pending.front() {
            if *offset > event.offset {
                break;
            }
            let (_, publish) = self
                .pending
                .pop_front()
                .ok_or_else(|| StreamError::Checkpoint("pending queue drained".to_string()))?;
            client
                .ack(&publish)
                .await
                .map_err(|e| StreamError::Checkpoint(e.to_string()))?;
        }

        Ok(())
    }
}

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct MqttPublisherConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub topic: String,
}

impl Default for MqttPublisherConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "vibro-replayer".to_string(),
            topic: "sensors/vibration".to_string(),
        }
    }
}

/// MQTT batch publisher.
pub struct MqttEventPublisher {
    config: MqttPublisherConfig,
    client: Option<AsyncClient>,
}

impl MqttEventPublisher {
    pub fn new(config: MqttPublisherConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Connect to the broker and start the background event loop.
    pub async fn connect(&mut self) -> Result<(), StreamError> {
        let mut options = MqttOptions::new(
            &self.config.client_id,
            &self.config.broker_host,
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut eventloop) = AsyncClient::new(options, 10);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(incoming)) => {
                        debug!("MQTT incoming: {:?}", incoming);
                    }
                    Err(e) => {
                        error!("MQTT error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    _ => {}
                }
            }
        });

        self.client = Some(client);
        info!(broker = %self.config.broker_host, "connected to MQTT broker");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for MqttEventPublisher {
    async fn send_batch(&mut self, payloads: Vec<Vec<u8>>) -> Result<(), StreamError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| StreamError::Connection("not connected".to_string()))?;

        for payload in payloads {
            client
                .publish(&self.config.topic, QoS::AtLeastOnce, false, payload)
                .await
                .map_err(|e| StreamError::Publish(e.to_string()))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(body: &str) -> Publish {
        Publish::new("sensors/vibration", QoS::AtLeastOnce, body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_assembler_splits_at_max_batch_size() {
        let assembler = BatchAssembler {
            max_batch_size: 2,
            batch_wait: Duration::from_secs(1),
        };
        let (tx, mut rx) = mpsc::channel(8);

        for body in ["a", "b", "c"] {
            tx.send(publish(body)).await.unwrap();
        }
        drop(tx);

        let first = assembler.collect(&mut rx).await.unwrap();
        assert_eq!(first.len(), 2);

        let second = assembler.collect(&mut rx).await.unwrap();
        assert_eq!(second.len(), 1);

        assert!(assembler.collect(&mut rx).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_assembler_flushes_partial_batch_at_deadline() {
        let assembler = BatchAssembler {
            max_batch_size: 10,
            batch_wait: Duration::from_millis(100),
        };
        let (tx, mut rx) = mpsc::channel(8);

        tx.send(publish("only")).await.unwrap();

        let batch = assembler.collect(&mut rx).await.unwrap();
        assert_eq!(batch.len(), 1);

        // Sender still open, nothing queued: deadline yields an empty batch.
        let empty = assembler.collect(&mut rx).await.unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_source_config_defaults() {
        let config = MqttSourceConfig::default();
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.max_batch_size, 100);
    }
}
