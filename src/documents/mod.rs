// src/documents/mod.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub mod http;
pub mod local;
#[cfg(test)]
pub mod memory;

pub use http::HttpDocumentStore;
pub use local::LocalDocumentStore;

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub shift_id: String,
    pub closed_by: String,
    pub closed_at: DateTime<Utc>,
    pub content_type: &'static str,
    pub extension: &'static str,
}

impl DocumentMetadata {
    /// Stable per closed shift, so a retried upload overwrites instead of duplicating.
    pub fn key(&self) -> String {
        let safe_id: String = self
            .shift_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!(
            "shift-{}-{}.{}",
            safe_id,
            self.closed_at.timestamp_millis(),
            self.extension
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("document upload failed: {0}")]
    Upload(String),
}

/// Blob storage for rendered reports.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist `bytes` and return a URL the document can be fetched from.
    async fn save(&self, bytes: Vec<u8>, meta: &DocumentMetadata) -> Result<String, DocumentError>;
}

/// Hex SHA-256 of a document body.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_path_safe_and_stable() {
        let meta = DocumentMetadata {
            shift_id: "../etc/passwd".into(),
            closed_by: "u1".into(),
            closed_at: "2026-10-19T20:00:00Z".parse().unwrap(),
            content_type: "application/pdf",
            extension: "pdf",
        };
        assert_eq!(meta.key(), "shift-___etc_passwd-1792440000000.pdf");
        assert_eq!(meta.key(), meta.key());
    }

    #[test]
    fn digest_is_hex_sha256() {
        assert_eq!(
            content_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
