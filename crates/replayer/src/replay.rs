//! Replay Loop
//!
//! Turns dataset rows into scorer-shaped JSON events and publishes them
//! in paced batches, preserving row order. One pass sends
//! ceil(rows / batch_size) batches; looping restarts from row zero with
//! the round-robin index reset, so every pass is identical.

use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Number, Value};
use tokio::sync::watch;
use tracing::{info, warn};

use event_stream::{EventPublisher, StreamError};

use crate::dataset::{ReplayDataset, ReplayRow};

/// Replay pacing and payload settings.
#[derive(Debug, Clone)]
pub struct ReplaySettings {
    /// Rows per published batch.
    pub batch_size: usize,
    /// Pause between batches.
    pub delay: Duration,
    /// Restart from row zero after a full pass.
    pub loop_replay: bool,
    /// Round-robin sensor names for rows without a sensor column value.
    pub sensor_ids: Vec<String>,
    /// Prefix for the outgoing feature keys (`feature_` gives
    /// `feature_1..feature_N`).
    pub output_prefix: String,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            delay: Duration::from_millis(500),
            loop_replay: true,
            sensor_ids: vec!["sim-1".to_string()],
            output_prefix: "feature_".to_string(),
        }
    }
}

/// Counters over a replay run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplayStats {
    pub passes: usize,
    pub batches: usize,
    pub events: usize,
}

/// Normalize a raw timestamp column value to seconds.
///
/// Magnitude heuristic: >1e12 reads as nanoseconds, >1e9 as
/// milliseconds, >1e6 as microseconds, anything else as seconds.
pub fn timestamp_seconds(raw: f64) -> f64 {
    if raw > 1e12 {
        raw / 1e9
    } else if raw > 1e9 {
        raw / 1e3
    } else if raw > 1e6 {
        raw / 1e6
    } else {
        raw
    }
}

/// Dataset replayer bound to one publisher.
pub struct Replayer<P: EventPublisher> {
    publisher: P,
    dataset: ReplayDataset,
    settings: ReplaySettings,
}

impl<P: EventPublisher> Replayer<P> {
    pub fn new(publisher: P, dataset: ReplayDataset, settings: ReplaySettings) -> Self {
        Self {
            publisher,
            dataset,
            settings,
        }
    }

    /// Replay the dataset until the pass completes (or forever when
    /// looping) or `shutdown` flips true.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ReplayStats, StreamError> {
        let mut stats = ReplayStats::default();
        if self.dataset.is_empty() {
            warn!("dataset has no rows, nothing to replay");
            return Ok(stats);
        }

        let rows = self.dataset.len();
        let batches = rows.div_ceil(self.settings.batch_size);
        info!(
            rows,
            batch_size = self.settings.batch_size,
            batches,
            sensors = ?self.settings.sensor_ids,
            loop_replay = self.settings.loop_replay,
            "replay starting"
        );

        'replay: loop {
            for number in 0..batches {
                let start = number * self.settings.batch_size;
                let end = usize::min(start + self.settings.batch_size, rows);
                let payloads: Vec<Vec<u8>> = (start..end)
                    .map(|index| {
                        payload_for_row(&self.dataset.rows()[index], index, &self.settings)
                    })
                    .collect();
                let sent = payloads.len();

                self.publisher.send_batch(payloads).await?;
                stats.batches += 1;
                stats.events += sent;
                info!(batch = number + 1, of = batches, events = sent, "batch sent");

                if self.wait_or_shutdown(&mut shutdown).await {
                    info!("shutdown requested, stopping replay");
                    break 'replay;
                }
            }

            stats.passes += 1;
            if !self.settings.loop_replay {
                break;
            }
            info!("replay pass complete, looping from start");
        }

        Ok(stats)
    }

    /// Sleep the configured inter-batch delay, returning `true` early
    /// when shutdown is requested.
    async fn wait_or_shutdown(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return true;
        }
        if self.settings.delay.is_zero() {
            return false;
        }
        tokio::select! {
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
            _ = tokio::time::sleep(self.settings.delay) => false,
        }
    }
}

/// Shape one dataset row into the scorer's pass-through payload.
///
/// `index` is the row position within the pass; it drives the
/// round-robin sensor assignment for rows without a sensor value.
fn payload_for_row(row: &ReplayRow, index: usize, settings: &ReplaySettings) -> Vec<u8> {
    let sensor_id = match &row.sensor_id {
        Some(id) => id.clone(),
        None => settings.sensor_ids[index % settings.sensor_ids.len()].clone(),
    };
    let seconds = match row.raw_timestamp {
        Some(raw) => timestamp_seconds(raw),
        None => Utc::now().timestamp_micros() as f64 / 1e6,
    };

    let mut payload = Map::new();
    payload.insert("sensor_id".to_string(), Value::String(sensor_id));
    payload.insert("timestamp".to_string(), json_number(seconds));
    for (position, value) in row.features.iter().enumerate() {
        payload.insert(
            format!("{}{}", settings.output_prefix, position + 1),
            json_number(*value),
        );
    }

    Value::Object(payload).to_string().into_bytes()
}

fn json_number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_stream::{channel_transport, BatchSource, ChannelBatchSource};
    use serde_json::json;

    fn row(sensor: Option<&str>, ts: Option<f64>, features: Vec<f64>) -> ReplayRow {
        ReplayRow {
            sensor_id: sensor.map(str::to_string),
            raw_timestamp: ts,
            features,
        }
    }

    fn settings(batch_size: usize, loop_replay: bool, sensors: &[&str]) -> ReplaySettings {
        ReplaySettings {
            batch_size,
            delay: Duration::ZERO,
            loop_replay,
            sensor_ids: sensors.iter().map(|s| s.to_string()).collect(),
            output_prefix: "feature_".to_string(),
        }
    }

    async fn collect_batches(
        source: &mut ChannelBatchSource,
    ) -> Vec<Vec<serde_json::Map<String, serde_json::Value>>> {
        let mut batches = Vec::new();
        while let Some(batch) = source.next_batch().await.unwrap() {
            if batch.is_empty() {
                continue;
            }
            batches.push(
                batch
                    .events
                    .iter()
                    .map(|event| serde_json::from_slice(&event.payload).unwrap())
                    .collect(),
            );
        }
        batches
    }

    #[test]
    fn test_timestamp_magnitude_heuristic() {
        assert_eq!(timestamp_seconds(1.7e18), 1.7e9);
        assert_eq!(timestamp_seconds(5e9), 5e6);
        assert_eq!(timestamp_seconds(2e6), 2.0);
        assert_eq!(timestamp_seconds(123.5), 123.5);
        assert_eq!(timestamp_seconds(-42.0), -42.0);
    }

    #[test]
    fn test_payload_shape_and_key_numbering() {
        let config = settings(4, false, &["sim-1"]);
        let bytes = payload_for_row(&row(None, Some(2e6), vec![1.5, 2.5]), 0, &config);
        let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(
            payload,
            json!({
                "sensor_id": "sim-1",
                "timestamp": 2.0,
                "feature_1": 1.5,
                "feature_2": 2.5,
            })
        );
    }

    #[test]
    fn test_missing_timestamp_uses_wall_clock() {
        let config = settings(4, false, &["sim-1"]);
        let bytes = payload_for_row(&row(None, None, vec![0.1]), 0, &config);
        let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        // Wall-clock epoch seconds, well past 1e9 on any current machine.
        assert!(payload["timestamp"].as_f64().unwrap() > 1e9);
    }

    #[tokio::test]
    async fn test_single_pass_batches_in_row_order() {
        let rows: Vec<ReplayRow> = (0..10)
            .map(|i| row(None, Some(100.0 + i as f64), vec![i as f64]))
            .collect();
        let dataset = ReplayDataset::from_rows(vec!["v".to_string()], rows);

        let (publisher, mut source) = channel_transport(16);
        let mut replayer = Replayer::new(publisher, dataset, settings(4, false, &["a", "b"]));

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = replayer.run(shutdown_rx).await.unwrap();
        drop(replayer);

        assert_eq!(stats.passes, 1);
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.events, 10);

        let batches = collect_batches(&mut source).await;
        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        assert_eq!(batches[0][0]["timestamp"], json!(100.0));
        assert_eq!(batches[2][1]["timestamp"], json!(109.0));
    }

    #[tokio::test]
    async fn test_round_robin_spans_batches() {
        let rows: Vec<ReplayRow> = (0..4).map(|i| row(None, Some(1.0), vec![i as f64])).collect();
        let dataset = ReplayDataset::from_rows(vec!["v".to_string()], rows);

        let (publisher, mut source) = channel_transport(8);
        let mut replayer = Replayer::new(publisher, dataset, settings(3, false, &["a", "b"]));

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        replayer.run(shutdown_rx).await.unwrap();
        drop(replayer);

        let batches = collect_batches(&mut source).await;
        let ids: Vec<String> = batches
            .iter()
            .flatten()
            .map(|payload| payload["sensor_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_sensor_column_overrides_round_robin() {
        let rows = vec![
            row(Some("wt-7"), Some(1.0), vec![0.0]),
            row(None, Some(1.0), vec![1.0]),
        ];
        let dataset = ReplayDataset::from_rows(vec!["v".to_string()], rows);

        let (publisher, mut source) = channel_transport(8);
        let mut replayer = Replayer::new(publisher, dataset, settings(2, false, &["a", "b"]));

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        replayer.run(shutdown_rx).await.unwrap();
        drop(replayer);

        let batches = collect_batches(&mut source).await;
        assert_eq!(batches[0][0]["sensor_id"], json!("wt-7"));
        // Row 1 still uses its own index against the rotation.
        assert_eq!(batches[0][1]["sensor_id"], json!("b"));
    }

    #[tokio::test]
    async fn test_loop_replay_restarts_and_honors_shutdown() {
        let rows = vec![
            row(Some("s1"), Some(1.0), vec![0.0]),
            row(Some("s2"), Some(1.0), vec![1.0]),
        ];
        let dataset = ReplayDataset::from_rows(vec!["v".to_string()], rows);

        let (publisher, mut source) = channel_transport(1);
        let mut replayer = Replayer::new(publisher, dataset, settings(1, true, &["a"]));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { replayer.run(shutdown_rx).await });

        let mut seen = Vec::new();
        while seen.len() < 3 {
            let batch = source.next_batch().await.unwrap().unwrap();
            for event in &batch.events {
                let payload: serde_json::Value = serde_json::from_slice(&event.payload).unwrap();
                seen.push(payload["sensor_id"].as_str().unwrap().to_string());
            }
        }
        // Second pass restarted from the first row.
        assert_eq!(seen, vec!["s1", "s2", "s1"]);

        shutdown_tx.send(true).unwrap();
        while let Some(_batch) = source.next_batch().await.unwrap() {}
        let stats = task.await.unwrap().unwrap();
        assert!(stats.batches >= 3);
    }
}
