//! Filesystem and In-memory Backends

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::{BlobError, BlobStore};

/// Filesystem-backed store reading `<root>/<container>/<path>`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn fetch(&self, container: &str, path: &str) -> Result<Vec<u8>, BlobError> {
        let full_path = self.root.join(container).join(path);
        debug!(path = %full_path.display(), "reading blob file");

        match tokio::fs::read(&full_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound {
                container: container.to_string(),
                path: path.to_string(),
            }),
            Err(e) => Err(BlobError::Fetch {
                container: container.to_string(),
                path: path.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// In-memory store for tests and in-process wiring.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, container: &str, path: &str, bytes: Vec<u8>) {
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.insert((container.to_string(), path.to_string()), bytes);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch(&self, container: &str, path: &str) -> Result<Vec<u8>, BlobError> {
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs
            .get(&(container.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| BlobError::NotFound {
                container: container.to_string(),
                path: path.to_string(),
            })
    }
}
