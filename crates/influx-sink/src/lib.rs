//! InfluxDB Sink
//!
//! Bridges scored events to InfluxDB v2 Line Protocol:
//! - Point model with tags, float fields and ns timestamps
//! - Line Protocol generation with escaping
//! - HTTP writer against the v2 write API, plus an in-memory writer for
//!   tests
//!
//! Writes are synchronous, one call per point; batching and retry stay
//! with the caller.

pub mod line;
pub mod writer;

use async_trait::async_trait;
use thiserror::Error;

pub use writer::{InfluxConfig, InfluxWriter, MemoryWriter};

/// Sink error types
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Write failed: {0}")]
    Write(String),

    #[error("Sink unreachable: {0}")]
    Unreachable(String),

    #[error("Point has no fields")]
    EmptyPoint,

    #[error("Client build failed: {0}")]
    Client(String),
}

/// One time-series point.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, f64)>,
    pub timestamp_ns: i64,
}

/// Synchronous point writer.
#[async_trait]
pub trait PointWriter: Send + Sync {
    /// Write one point. A point without fields is rejected.
    async fn write_point(&self, point: &Point) -> Result<(), SinkError>;
}
