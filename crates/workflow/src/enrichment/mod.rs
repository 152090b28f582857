//! Enrichment: attaching supplier, product, customer and delivery data to
//! a validated order.
//!
//! Sources run concurrently. A failing optional source shrinks the
//! enrichment map and leaves a warning; a failing required source fails
//! the order.

mod coordinator;
mod document;
mod sources;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use domain::ValidatedOrder;
use serde_json::Value;
use thiserror::Error;

use crate::retry::IsTransient;

pub use coordinator::{
    EnrichmentCoordinator, EnrichmentOutcome, EnrichmentPolicy, SourceFailure,
};
pub use document::{DocumentStore, InMemoryDocumentStore};
pub use sources::{
    CUSTOMERS_COLLECTION, CustomerProfileSource, DEFAULT_DELIVERY_KEY, DELIVERY_COLLECTION,
    DeliveryDataSource, PRODUCTS_COLLECTION, ProductCatalogSource,
};

/// Enrichment key holding a list of human-readable warning strings.
///
/// Sources may return their own list under this key; the coordinator
/// concatenates them instead of letting one overwrite another.
pub const WARNINGS_KEY: &str = "warnings";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The source answered but has no data for the key.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IsTransient for SourceError {
    fn is_transient(&self) -> bool {
        matches!(self, SourceError::Unavailable(_) | SourceError::Timeout(_))
    }
}

/// What a source gets to look at.
#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    pub order_id: OrderId,
    pub order: ValidatedOrder,
}

/// An external data collaborator.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// Stable name, used in the required-source policy and in metrics.
    fn name(&self) -> &str;

    async fn fetch(&self, request: &EnrichmentRequest)
    -> Result<BTreeMap<String, Value>, SourceError>;
}
