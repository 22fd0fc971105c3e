// src/documents/http.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{content_digest, DocumentError, DocumentMetadata, DocumentStore};

/// Uploads documents with `PUT <base>/reports/<key>` to an object-storage style endpoint.
/// The uploaded object's URL is returned as the retrieval URL.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DocumentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocumentError::Upload(format!("reqwest build error: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn save(&self, bytes: Vec<u8>, meta: &DocumentMetadata) -> Result<String, DocumentError> {
        let url = format!("{}/reports/{}", self.base_url, meta.key());
        let digest = content_digest(&bytes);

        self.client
            .put(&url)
            .header(CONTENT_TYPE, meta.content_type)
            .header("x-content-sha256", &digest)
            .header("x-shift-id", &meta.shift_id)
            .header("x-closed-by", &meta.closed_by)
            .header("x-closed-at", meta.closed_at.to_rfc3339())
            .body(bytes)
            .send()
            .await
            .map_err(|e| DocumentError::Upload(e.to_string()))?
            .error_for_status()
            .map_err(|e| DocumentError::Upload(e.to_string()))?;

        debug!(shift_id = %meta.shift_id, %url, sha256 = %digest, "report uploaded");
        Ok(url)
    }
}
