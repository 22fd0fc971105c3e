// src/documents/local.rs

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{content_digest, DocumentError, DocumentMetadata, DocumentStore};

/// Writes documents under a directory that the API serves at `/reports`.
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Directory the documents are written to; the same one is served at `/reports`.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn save(&self, bytes: Vec<u8>, meta: &DocumentMetadata) -> Result<String, DocumentError> {
        fs::create_dir_all(&self.root).await?;

        let key = meta.key();
        let target = self.root.join(&key);
        let partial = self.root.join(format!("{key}.partial"));

        // rename is atomic on one filesystem; readers never see half a file
        fs::write(&partial, &bytes).await?;
        fs::rename(&partial, &target).await?;

        debug!(
            shift_id = %meta.shift_id,
            path = %target.display(),
            sha256 = %content_digest(&bytes),
            "report stored on disk"
        );
        Ok(format!("{}/reports/{}", self.public_base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_file_and_returns_public_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path(), "http://127.0.0.1:8080/");
        let meta = DocumentMetadata {
            shift_id: "s1".into(),
            closed_by: "u1".into(),
            closed_at: "2026-10-19T20:00:00Z".parse().unwrap(),
            content_type: "application/pdf",
            extension: "pdf",
        };

        let url = store.save(b"%PDF-1.4".to_vec(), &meta).await.unwrap();
        assert_eq!(url, format!("http://127.0.0.1:8080/reports/{}", meta.key()));

        assert_eq!(store.root(), dir.path());
        let written = fs::read(store.root().join(meta.key())).await.unwrap();
        assert_eq!(written, b"%PDF-1.4");

        // retry overwrites the same key
        let again = store.save(b"%PDF-1.4 v2".to_vec(), &meta).await.unwrap();
        assert_eq!(again, url);
    }
}
