//! Order aggregate and related types.

mod aggregate;
mod events;
mod record;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use events::{
    OrderCancelledData, OrderConfirmedData, OrderCreatedData, OrderDeliveredData,
    OrderEnrichedData, OrderEvent, OrderFailedData, OrderValidatedData,
    OrderValidationStartedData, REASON_ENRICHMENT_SOURCE_UNAVAILABLE, REASON_VALIDATION_FAILED,
};
pub use record::{InMemoryOrderRecordStore, OrderRecord, OrderRecordStore};
pub use service::{OrderService, RecordOutcome};
pub use state::OrderState;
pub use value_objects::{
    Currency, CustomerId, IDENTIFIER_MAX_LEN, IDENTIFIER_MIN_LEN, MAX_QUANTITY,
    MAX_UNIT_PRICE_CENTS, Money, OrderItem, ProductId, ValueError, identifier_violations,
};

use common::OrderId;
use thiserror::Error;

/// Errors raised by the order aggregate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    /// The event is not a legal transition from the current state.
    #[error(
        "Invalid transition: cannot apply {event_type} to order in state {}",
        .from.map_or("(none)", |s| s.as_str())
    )]
    InvalidTransition {
        from: Option<OrderState>,
        event_type: &'static str,
    },

    /// The event belongs to a different order.
    #[error("Event for order {actual} applied to order {expected}")]
    OrderMismatch { expected: OrderId, actual: OrderId },

    #[error("Order already created")]
    AlreadyCreated,
}

impl OrderError {
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, OrderError::InvalidTransition { .. })
    }
}
