// src/documents/memory.rs

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{DocumentError, DocumentMetadata, DocumentStore};

/// Keeps documents in memory; can be told to fail uploads.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    docs: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryDocumentStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn urls(&self) -> Vec<String> {
        self.docs.lock().await.keys().cloned().collect()
    }

    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.docs.lock().await.get(url).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn save(&self, bytes: Vec<u8>, meta: &DocumentMetadata) -> Result<String, DocumentError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DocumentError::Upload("bucket unavailable".into()));
        }
        let url = format!("memory://reports/{}", meta.key());
        self.docs.lock().await.insert(url.clone(), bytes);
        Ok(url)
    }
}
