//! Record store for raw order submissions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CorrelationId, OrderId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DomainError;
use crate::validation::OrderPayload;

/// The order as it was received, kept alongside its event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub payload: OrderPayload,
    pub received_at: DateTime<Utc>,
    pub source_system: String,
    pub correlation_id: CorrelationId,
}

/// Read/write access to order records keyed by order id.
#[async_trait]
pub trait OrderRecordStore: Send + Sync {
    /// Inserts or replaces the record.
    async fn save(&self, record: OrderRecord) -> Result<(), DomainError>;

    async fn get(&self, order_id: &OrderId) -> Result<Option<OrderRecord>, DomainError>;
}

#[derive(Debug, Default)]
struct RecordState {
    records: HashMap<OrderId, OrderRecord>,
    unavailable: bool,
}

/// In-memory record store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRecordStore {
    state: Arc<RwLock<RecordState>>,
}

impl InMemoryOrderRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with a transient error (for testing).
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrderRecordStore for InMemoryOrderRecordStore {
    async fn save(&self, record: OrderRecord) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if state.unavailable {
            return Err(DomainError::RecordStore("record store unavailable".to_string()));
        }
        state.records.insert(record.order_id.clone(), record);
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<OrderRecord>, DomainError> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(DomainError::RecordStore("record store unavailable".to_string()));
        }
        Ok(state.records.get(order_id).cloned())
    }
}
