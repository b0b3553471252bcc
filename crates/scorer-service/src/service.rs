//! Service Startup and Wiring
//!
//! Resolves everything the pipeline needs before the first event is
//! consumed. Any failure in the chain aborts startup; a scorer that
//! cannot fetch its model or reach its sink must not drain the stream.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use blob_store::{BlobStore, HttpBlobStore};
use event_stream::{BatchSource, MqttBatchSource, StartPosition};
use influx_sink::{InfluxWriter, PointWriter};
use scoring_engine::ModelHandle;
use signal_features::SignalFeatureExtractor;

use crate::config::ServiceConfig;
use crate::pipeline::{BatchPipeline, PipelineConfig, PipelineStats};
use crate::ServiceError;

/// Run the scorer end to end: fetch and resolve the model, verify the
/// sink, subscribe from latest, then pump batches until `shutdown`
/// flips true or the source closes.
pub async fn run(
    config: ServiceConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<PipelineStats, ServiceError> {
    info!(
        broker = %config.source.broker_host,
        topic = %config.source.topic,
        container = %config.model_container,
        model = %config.model_path,
        bucket = %config.influx.bucket,
        "starting anomaly scorer"
    );

    let blob_store = HttpBlobStore::new(&config.blob_endpoint, config.blob_token.clone())?;
    let artifact = blob_store
        .fetch(&config.model_container, &config.model_path)
        .await?;
    let model = Arc::new(ModelHandle::load(&artifact)?);

    let sink = InfluxWriter::new(config.influx.clone())?;
    sink.ping().await?;
    let sink: Arc<dyn PointWriter> = Arc::new(sink);

    let extractor = SignalFeatureExtractor::new(&config.extractor)
        .with_expected_features(model.expected_features());

    let mut source = MqttBatchSource::new(config.source.clone());
    source.subscribe(StartPosition::Latest).await?;

    let mut pipeline = BatchPipeline::new(
        source,
        extractor,
        model,
        sink,
        PipelineConfig {
            score_measurement: config.score_measurement.clone(),
            feature_measurement: config.feature_measurement.clone(),
        },
    );

    let stats = pipeline.run(shutdown).await?;
    info!(
        batches = stats.batches,
        events = stats.events,
        emitted = stats.emitted,
        failed = stats.failed,
        "anomaly scorer stopped"
    );
    Ok(stats)
}
