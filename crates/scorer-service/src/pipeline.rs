//! Checkpointing Batch Pipeline
//!
//! Receives event batches, processes each event independently, writes
//! the results to the sink and commits the offset of the last event of
//! the batch exactly once. Per-event failures are logged and counted
//! but never abort the batch, so one bad payload cannot stall the
//! partition. Checkpointing after emission gives at-least-once
//! delivery: a crash mid-batch replays the whole batch.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use event_stream::{BatchSource, EventBatch, StreamError, StreamEvent};
use influx_sink::{Point, PointWriter, SinkError};
use scoring_engine::{ModelError, ModelHandle};
use signal_features::{
    resolve_device_id, ExtractError, ExtractionMode, SignalFeatureExtractor,
};

/// Per-event failure, classified for batch summary logs.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("feature count mismatch: {0}")]
    FeatureCount(String),

    #[error("no usable signal: {0}")]
    NoSignal(String),

    #[error("no finite output fields")]
    NoFiniteFeatures,

    #[error("sink write failed: {0}")]
    SinkWrite(#[from] SinkError),
}

impl EventError {
    /// Stable label used in the per-event warning logs.
    pub fn class(&self) -> &'static str {
        match self {
            EventError::MalformedPayload(_) => "malformed_payload",
            EventError::FeatureCount(_) => "feature_count",
            EventError::NoSignal(_) => "no_signal",
            EventError::NoFiniteFeatures => "no_finite_features",
            EventError::SinkWrite(_) => "sink_write",
        }
    }
}

impl From<ExtractError> for EventError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::FeatureCount { .. } => EventError::FeatureCount(e.to_string()),
            ExtractError::NoSignal { .. } => EventError::NoSignal(e.to_string()),
            ExtractError::NoFiniteFeatures => EventError::NoFiniteFeatures,
            ExtractError::MalformedPayload => EventError::MalformedPayload(e.to_string()),
        }
    }
}

impl From<ModelError> for EventError {
    fn from(e: ModelError) -> Self {
        // Decode and capability problems are caught at startup; the only
        // scoring error left per event is a width mismatch.
        EventError::FeatureCount(e.to_string())
    }
}

/// Output of one successfully processed event, ready to become a point.
#[derive(Debug, Clone)]
pub struct ScoreResult {
    /// Device the point is tagged with.
    pub device_id: String,
    /// Target measurement.
    pub measurement: String,
    /// Tag key carrying the device id (`sensor_id` for scores,
    /// `device_id` for DSP features).
    pub tag_key: &'static str,
    /// Finite numeric fields; never empty.
    pub fields: Vec<(String, f64)>,
    /// Event time resolved from payload, enqueue time or wall clock.
    pub timestamp: DateTime<Utc>,
}

impl ScoreResult {
    fn into_point(self) -> Point {
        Point {
            measurement: self.measurement,
            tags: vec![(self.tag_key.to_string(), self.device_id)],
            fields: self.fields,
            timestamp_ns: self.timestamp.timestamp_nanos_opt().unwrap_or_default(),
        }
    }
}

/// Measurement routing for the two extraction modes.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Measurement receiving the single `score` field.
    pub score_measurement: String,
    /// Measurement receiving the DSP feature fields.
    pub feature_measurement: String,
}

/// Counters for one processed batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchOutcome {
    /// Events taken from the batch.
    pub processed: usize,
    /// Points accepted by the sink.
    pub emitted: usize,
    /// Events dropped with a classified error.
    pub failed: usize,
    /// Whether the batch offset was committed.
    pub checkpointed: bool,
}

/// Counters over a whole pipeline run.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineStats {
    pub batches: usize,
    pub events: usize,
    pub emitted: usize,
    pub failed: usize,
}

impl PipelineStats {
    fn absorb(&mut self, outcome: &BatchOutcome) {
        self.batches += 1;
        self.events += outcome.processed;
        self.emitted += outcome.emitted;
        self.failed += outcome.failed;
    }
}

/// Batch scorer over one partition source.
///
/// The model handle and the sink are shared; the extractor holds
/// per-pipeline FFT state and stays private.
pub struct BatchPipeline<S: BatchSource> {
    source: S,
    extractor: SignalFeatureExtractor,
    model: Arc<ModelHandle>,
    sink: Arc<dyn PointWriter>,
    config: PipelineConfig,
}

impl<S: BatchSource> BatchPipeline<S> {
    pub fn new(
        source: S,
        extractor: SignalFeatureExtractor,
        model: Arc<ModelHandle>,
        sink: Arc<dyn PointWriter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            extractor,
            model,
            sink,
            config,
        }
    }

    /// Consume batches until the source closes or `shutdown` flips true.
    ///
    /// Shutdown is honored at the receive boundary only; a batch already
    /// taken is always processed, emitted and checkpointed in full.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<PipelineStats, StreamError> {
        let mut stats = PipelineStats::default();

        loop {
            let batch = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("shutdown requested, stopping batch receive");
                        break;
                    }
                    continue;
                }
                batch = self.source.next_batch() => batch?,
            };

            let Some(batch) = batch else {
                info!("event source closed");
                break;
            };
            if batch.is_empty() {
                continue;
            }

            let outcome = self.process_batch(&batch).await?;
            stats.absorb(&outcome);
        }

        Ok(stats)
    }

    /// Process one batch: score every event, emit the survivors, then
    /// commit the last offset exactly once.
    pub async fn process_batch(&mut self, batch: &EventBatch) -> Result<BatchOutcome, StreamError> {
        let started = Instant::now();
        let total = batch.len();
        let mut outcome = BatchOutcome {
            processed: total,
            ..BatchOutcome::default()
        };
        let mut results = Vec::with_capacity(total);

        for (index, event) in batch.events.iter().enumerate() {
            debug!(
                partition = %batch.partition_id,
                event = index + 1,
                total,
                offset = event.offset,
                "processing event"
            );
            match self.process_event(event) {
                Ok(result) => results.push((event.offset, result)),
                Err(err) => {
                    warn!(
                        partition = %batch.partition_id,
                        offset = event.offset,
                        class = err.class(),
                        error = %err,
                        "event dropped"
                    );
                    outcome.failed += 1;
                }
            }
        }

        for (offset, result) in results {
            match self.sink.write_point(&result.into_point()).await {
                Ok(()) => outcome.emitted += 1,
                Err(e) => {
                    let err = EventError::from(e);
                    warn!(
                        partition = %batch.partition_id,
                        offset,
                        class = err.class(),
                        error = %err,
                        "point rejected"
                    );
                    outcome.failed += 1;
                }
            }
        }

        // One commit per batch, regardless of per-event failures.
        if let Some(last) = batch.events.last() {
            self.source.checkpoint(last).await?;
            outcome.checkpointed = true;
        }

        info!(
            partition = %batch.partition_id,
            events = total,
            emitted = outcome.emitted,
            failed = outcome.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch complete"
        );
        Ok(outcome)
    }

    fn process_event(&mut self, event: &StreamEvent) -> Result<ScoreResult, EventError> {
        let payload: Map<String, Value> = serde_json::from_slice(&event.payload)
            .map_err(|e| EventError::MalformedPayload(e.to_string()))?;

        let vector = self.extractor.extract(&payload)?;
        let device_id = resolve_device_id(&payload, vector.mode(), &event.partition_id);
        let timestamp = event_timestamp(&payload, event);

        let (measurement, tag_key, fields) = match vector.mode() {
            ExtractionMode::PassThrough => {
                let score = self.model.score(&vector)?;
                debug!(sensor = %device_id, score, features = vector.len(), "scored event");
                (
                    self.config.score_measurement.clone(),
                    "sensor_id",
                    vec![("score".to_string(), score)],
                )
            }
            ExtractionMode::Dsp => (
                self.config.feature_measurement.clone(),
                "device_id",
                vector.fields().to_vec(),
            ),
        };

        let fields: Vec<(String, f64)> = fields
            .into_iter()
            .filter(|(_, value)| value.is_finite())
            .collect();
        if fields.is_empty() {
            return Err(EventError::NoFiniteFeatures);
        }

        Ok(ScoreResult {
            device_id,
            measurement,
            tag_key,
            fields,
            timestamp,
        })
    }
}

/// Event time: payload `timestamp` (seconds since the epoch) when
/// present and sane, else the transport enqueue time, else wall clock.
fn event_timestamp(payload: &Map<String, Value>, event: &StreamEvent) -> DateTime<Utc> {
    if let Some(seconds) = payload.get("timestamp").and_then(Value::as_f64) {
        if seconds.is_finite() && seconds >= 0.0 {
            let nanos = (seconds * 1e9) as i64;
            let parsed = DateTime::from_timestamp(
                nanos.div_euclid(1_000_000_000),
                nanos.rem_euclid(1_000_000_000) as u32,
            );
            if let Some(ts) = parsed {
                return ts;
            }
        }
    }
    event.enqueued_at.unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_stream::channel_transport;
    use event_stream::EventPublisher;
    use influx_sink::MemoryWriter;
    use scoring_engine::{CentroidSpec, EstimatorSpec, ModelArtifact};
    use serde_json::json;
    use signal_features::ExtractorConfig;

    fn centroid_model(n_features: usize) -> Arc<ModelHandle> {
        let spec = EstimatorSpec {
            n_features: Some(n_features),
            decision_function: Some(CentroidSpec {
                center: vec![0.0; n_features],
                offset: 1.0,
            }),
            ..EstimatorSpec::default()
        };
        Arc::new(ModelHandle::resolve(ModelArtifact::Estimator(spec)).unwrap())
    }

    fn test_pipeline(
        feature_count: usize,
    ) -> (
        event_stream::ChannelEventPublisher,
        std::sync::Arc<std::sync::Mutex<Vec<event_stream::Checkpoint>>>,
        Arc<MemoryWriter>,
        BatchPipeline<event_stream::ChannelBatchSource>,
    ) {
        let (publisher, source) = channel_transport(16);
        let source = source.with_recv_wait(std::time::Duration::from_millis(20));
        let log = source.checkpoint_log();
        let model = centroid_model(feature_count);
        let sink = Arc::new(MemoryWriter::new());
        let extractor = SignalFeatureExtractor::new(&ExtractorConfig {
            feature_count,
            ..ExtractorConfig::default()
        })
        .with_expected_features(model.expected_features());
        let pipeline = BatchPipeline::new(
            source,
            extractor,
            model,
            sink.clone(),
            PipelineConfig {
                score_measurement: "anomaly_score".to_string(),
                feature_measurement: "signal_features".to_string(),
            },
        );
        (publisher, log, sink, pipeline)
    }

    fn scoring_payload(sensor: &str, v1: f64, v2: f64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "sensor_id": sensor,
            "feature_1": v1,
            "feature_2": v2,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_batch_checkpoints_once_despite_failures() {
        let (mut publisher, log, sink, mut pipeline) = test_pipeline(2);

        publisher
            .send_batch(vec![
                scoring_payload("s1", 0.1, 0.2),
                b"{broken".to_vec(),
                scoring_payload("s2", 0.3, 0.4),
                b"not json at all".to_vec(),
                scoring_payload("s3", 0.5, 0.6),
            ])
            .await
            .unwrap();
        drop(publisher);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = pipeline.run(shutdown_rx).await.unwrap();

        assert_eq!(stats.batches, 1);
        assert_eq!(stats.events, 5);
        assert_eq!(stats.emitted, 3);
        assert_eq!(stats.failed, 2);
        assert_eq!(sink.points().len(), 3);

        let committed = log.lock().unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].offset, 4);
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_checkpointed() {
        let (mut publisher, log, sink, mut pipeline) = test_pipeline(2);

        publisher.send_batch(Vec::new()).await.unwrap();
        drop(publisher);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = pipeline.run(shutdown_rx).await.unwrap();

        assert_eq!(stats.batches, 0);
        assert!(sink.points().is_empty());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_block_batch() {
        let (mut publisher, log, sink, mut pipeline) = test_pipeline(2);
        sink.fail_when_tagged("s2");

        publisher
            .send_batch(vec![
                scoring_payload("s1", 0.1, 0.2),
                scoring_payload("s2", 0.3, 0.4),
                scoring_payload("s3", 0.5, 0.6),
            ])
            .await
            .unwrap();
        drop(publisher);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = pipeline.run(shutdown_rx).await.unwrap();

        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.failed, 1);
        let tags: Vec<String> = sink
            .points()
            .iter()
            .map(|p| p.tags[0].1.clone())
            .collect();
        assert_eq!(tags, vec!["s1", "s3"]);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_modes_route_to_their_measurements() {
        let (mut publisher, _log, sink, mut pipeline) = test_pipeline(2);

        let dsp = serde_json::to_vec(&json!({
            "device_id": "press-7",
            "fs": 100.0,
            "ax": [0.0, 1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0],
        }))
        .unwrap();
        publisher
            .send_batch(vec![scoring_payload("pump-1", 0.1, 0.2), dsp])
            .await
            .unwrap();
        drop(publisher);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        pipeline.run(shutdown_rx).await.unwrap();

        let points = sink.points();
        assert_eq!(points.len(), 2);

        assert_eq!(points[0].measurement, "anomaly_score");
        assert_eq!(points[0].tags, vec![("sensor_id".to_string(), "pump-1".to_string())]);
        assert_eq!(points[0].fields.len(), 1);
        assert_eq!(points[0].fields[0].0, "score");

        assert_eq!(points[1].measurement, "signal_features");
        assert_eq!(points[1].tags, vec![("device_id".to_string(), "press-7".to_string())]);
        assert!(points[1].fields.iter().any(|(k, _)| k == "rms_ax"));
    }

    #[tokio::test]
    async fn test_payload_timestamp_wins() {
        let (mut publisher, _log, sink, mut pipeline) = test_pipeline(2);

        let payload = serde_json::to_vec(&json!({
            "sensor_id": "s1",
            "timestamp": 1_700_000_000.5,
            "feature_1": 0.1,
            "feature_2": 0.2,
        }))
        .unwrap();
        publisher.send_batch(vec![payload]).await.unwrap();
        drop(publisher);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        pipeline.run(shutdown_rx).await.unwrap();

        let points = sink.points();
        assert_eq!(points[0].timestamp_ns, 1_700_000_000_500_000_000);
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_next_batch() {
        let (publisher, _log, _sink, mut pipeline) = test_pipeline(2);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        // Publisher stays alive, so only the shutdown signal can end the run.
        let stats = pipeline.run(shutdown_rx).await.unwrap();
        assert_eq!(stats.batches, 0);
        drop(publisher);
    }

    #[test]
    fn test_event_error_classes() {
        assert_eq!(
            EventError::MalformedPayload("x".to_string()).class(),
            "malformed_payload"
        );
        assert_eq!(EventError::NoFiniteFeatures.class(), "no_finite_features");
        assert_eq!(
            EventError::from(ExtractError::NoSignal {
                sample_rate_hz: 0.0,
                samples: 0
            })
            .class(),
            "no_signal"
        );
    }
}
