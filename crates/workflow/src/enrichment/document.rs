use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::SourceError;

/// Read access to enrichment documents keyed by collection and id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, SourceError>;
}

#[derive(Debug, Default)]
struct DocumentState {
    documents: HashMap<(String, String), Value>,
    unavailable: HashSet<String>,
    latency: Duration,
}

/// In-memory document store with switches for outages and latency.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<DocumentState>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, collection: &str, key: &str, document: Value) {
        self.state
            .write()
            .await
            .documents
            .insert((collection.to_string(), key.to_string()), document);
    }

    /// Makes every read from `collection` fail as unavailable.
    pub async fn set_collection_unavailable(&self, collection: &str, unavailable: bool) {
        let mut state = self.state.write().await;
        if unavailable {
            state.unavailable.insert(collection.to_string());
        } else {
            state.unavailable.remove(collection);
        }
    }

    /// Delays every read by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, SourceError> {
        let latency = self.state.read().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let state = self.state.read().await;
        if state.unavailable.contains(collection) {
            return Err(SourceError::Unavailable(format!(
                "collection {collection} is unavailable"
            )));
        }
        Ok(state
            .documents
            .get(&(collection.to_string(), key.to_string()))
            .cloned())
    }
}
