//! Domain error types.

use common::OrderId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::order::{OrderError, ValueError};

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Order error: {0}")]
    Order(OrderError),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Invalid value: {0}")]
    Value(#[from] ValueError),

    #[error("Record store error: {0}")]
    RecordStore(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// True for infrastructure faults that a later retry may clear.
    pub fn is_transient(&self) -> bool {
        match self {
            DomainError::EventStore(e) => e.is_transient(),
            DomainError::RecordStore(_) => true,
            _ => false,
        }
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, DomainError::Order(e) if e.is_invalid_transition())
    }
}
