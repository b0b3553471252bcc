//! Vibration Dataset Replayer
//!
//! Publishes feature rows from a blob-hosted Parquet dataset to the
//! broker to simulate a live sensor stream. Columns are selected
//! explicitly or by numeric dtype, each row becomes one JSON event in
//! the scorer's pass-through shape and batches go out with a pacing
//! delay, optionally looping forever.

pub mod config;
pub mod dataset;
pub mod replay;

pub use config::{ConfigError, ReplayConfig};
pub use dataset::{select_feature_columns, DatasetError, ReplayDataset, ReplayRow};
pub use replay::{timestamp_seconds, ReplaySettings, ReplayStats, Replayer};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use blob_store::{BlobStore, HttpBlobStore};
use event_stream::MqttEventPublisher;

/// Errors that abort a replay run
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Blob(#[from] blob_store::BlobError),

    #[error(transparent)]
    Dataset(#[from] dataset::DatasetError),

    #[error(transparent)]
    Stream(#[from] event_stream::StreamError),
}

/// Run the replayer end to end: fetch the dataset, resolve columns,
/// connect the publisher and replay until done or shut down.
pub async fn run(
    config: ReplayConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<ReplayStats, ReplayError> {
    let blob_store = HttpBlobStore::new(&config.blob_endpoint, config.blob_token.clone())?;
    let bytes = blob_store
        .fetch(&config.dataset_container, &config.dataset_path)
        .await?;
    let dataset = ReplayDataset::from_bytes(
        bytes,
        config.feature_keys.as_deref(),
        config.feature_count,
        config.sensor_column.as_deref(),
        config.timestamp_column.as_deref(),
    )?;
    info!(
        rows = dataset.len(),
        features = dataset.feature_columns().len(),
        first_key = %format!("{}1", config.settings.output_prefix),
        last_key = %format!("{}{}", config.settings.output_prefix, dataset.feature_columns().len()),
        "dataset ready"
    );

    let mut publisher = MqttEventPublisher::new(config.publisher.clone());
    publisher.connect().await?;

    let mut replayer = Replayer::new(publisher, dataset, config.settings.clone());
    let stats = replayer.run(shutdown).await?;
    info!(
        passes = stats.passes,
        batches = stats.batches,
        events = stats.events,
        "replayer stopped"
    );
    Ok(stats)
}

/// Initialize logging
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}
