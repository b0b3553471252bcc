//! Vibration Anomaly Scorer Service
//!
//! Consumes vibration events from the broker in batches, turns each
//! event into a feature vector (pass-through or DSP), scores
//! pass-through vectors with the blob-hosted model and writes the
//! results to InfluxDB with at-least-once checkpointing.

pub mod config;
pub mod pipeline;
pub mod service;

pub use config::{ConfigError, ServiceConfig};
pub use pipeline::{
    BatchOutcome, BatchPipeline, EventError, PipelineConfig, PipelineStats, ScoreResult,
};
pub use service::run;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Errors that abort service startup
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Blob(#[from] blob_store::BlobError),

    #[error(transparent)]
    Model(#[from] scoring_engine::ModelError),

    #[error(transparent)]
    Sink(#[from] influx_sink::SinkError),

    #[error(transparent)]
    Stream(#[from] event_stream::StreamError),
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
