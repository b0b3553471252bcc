//! HTTP Blob Backend

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{BlobError, BlobStore};

/// Blob fetch over HTTP.
///
/// Addresses blobs as `<endpoint>/<container>/<path>`, with an optional
/// bearer token for private stores.
pub struct HttpBlobStore {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpBlobStore {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self, BlobError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BlobError::Client(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn fetch_error(container: &str, path: &str, reason: String) -> BlobError {
        BlobError::Fetch {
            container: container.to_string(),
            path: path.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn fetch(&self, container: &str, path: &str) -> Result<Vec<u8>, BlobError> {
        let url = format!("{}/{}/{}", self.endpoint, container, path);
        debug!(%url, "fetching blob");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::fetch_error(container, path, e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound {
                container: container.to_string(),
                path: path.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(Self::fetch_error(
                container,
                path,
                format!("status {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::fetch_error(container, path, e.to_string()))?;

        info!(container, path, bytes = bytes.len(), "blob fetched");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash_is_trimmed() {
        let store = HttpBlobStore::new("http://blobs.local/", None).unwrap();
        assert_eq!(store.endpoint, "http://blobs.local");
    }
}
