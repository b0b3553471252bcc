//! Blob Store Access
//!
//! Read-only fetch of named blobs (model artifacts, replay datasets) from
//! a container/path namespace. Backends: HTTP endpoint, local filesystem,
//! in-memory map for tests.

pub mod http;
pub mod local;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpBlobStore;
pub use local::{FsBlobStore, MemoryBlobStore};

/// Blob access error types
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Blob not found: {container}/{path}")]
    NotFound { container: String, path: String },

    #[error("Fetch failed for {container}/{path}: {reason}")]
    Fetch {
        container: String,
        path: String,
        reason: String,
    },

    #[error("Client build failed: {0}")]
    Client(String),
}

/// Read-only blob fetch.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the full contents of `path` inside `container`.
    async fn fetch(&self, container: &str, path: &str) -> Result<Vec<u8>, BlobError>;
}
