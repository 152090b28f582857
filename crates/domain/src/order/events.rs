//! Order domain events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::Money;

/// Failure reason recorded when the validation engine rejects an order.
pub const REASON_VALIDATION_FAILED: &str = "validation_failed";
/// Failure reason recorded when a required enrichment source is unavailable.
pub const REASON_ENRICHMENT_SOURCE_UNAVAILABLE: &str = "enrichment_required_source_unavailable";

/// Events recorded in an order's log, one per lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderCreated(OrderCreatedData),
    OrderValidationStarted(OrderValidationStartedData),
    OrderValidated(OrderValidatedData),
    OrderEnriched(OrderEnrichedData),
    OrderConfirmed(OrderConfirmedData),
    OrderCancelled(OrderCancelledData),
    OrderFailed(OrderFailedData),
    OrderDelivered(OrderDeliveredData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::OrderValidationStarted(_) => "OrderValidationStarted",
            OrderEvent::OrderValidated(_) => "OrderValidated",
            OrderEvent::OrderEnriched(_) => "OrderEnriched",
            OrderEvent::OrderConfirmed(_) => "OrderConfirmed",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::OrderFailed(_) => "OrderFailed",
            OrderEvent::OrderDelivered(_) => "OrderDelivered",
        }
    }

    fn order_id(&self) -> &OrderId {
        match self {
            OrderEvent::OrderCreated(d) => &d.order_id,
            OrderEvent::OrderValidationStarted(d) => &d.order_id,
            OrderEvent::OrderValidated(d) => &d.order_id,
            OrderEvent::OrderEnriched(d) => &d.order_id,
            OrderEvent::OrderConfirmed(d) => &d.order_id,
            OrderEvent::OrderCancelled(d) => &d.order_id,
            OrderEvent::OrderFailed(d) => &d.order_id,
            OrderEvent::OrderDelivered(d) => &d.order_id,
        }
    }
}

impl OrderEvent {
    /// When the transition happened.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(d) => d.created_at,
            OrderEvent::OrderValidationStarted(d) => d.started_at,
            OrderEvent::OrderValidated(d) => d.validated_at,
            OrderEvent::OrderEnriched(d) => d.enriched_at,
            OrderEvent::OrderConfirmed(d) => d.confirmed_at,
            OrderEvent::OrderCancelled(d) => d.cancelled_at,
            OrderEvent::OrderFailed(d) => d.failed_at,
            OrderEvent::OrderDelivered(d) => d.delivered_at,
        }
    }

    pub fn created(order_id: OrderId, customer_id: impl Into<String>) -> Self {
        OrderEvent::OrderCreated(OrderCreatedData {
            order_id,
            customer_id: customer_id.into(),
            created_at: Utc::now(),
        })
    }

    pub fn validation_started(order_id: OrderId) -> Self {
        OrderEvent::OrderValidationStarted(OrderValidationStartedData {
            order_id,
            started_at: Utc::now(),
        })
    }

    pub fn validated(order_id: OrderId) -> Self {
        OrderEvent::OrderValidated(OrderValidatedData {
            order_id,
            validated_at: Utc::now(),
        })
    }

    pub fn enriched(
        order_id: OrderId,
        enrichment_data: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        OrderEvent::OrderEnriched(OrderEnrichedData {
            order_id,
            enrichment_data,
            enriched_at: Utc::now(),
        })
    }

    pub fn confirmed(
        order_id: OrderId,
        confirmation_id: impl Into<String>,
        supplier_id: impl Into<String>,
        total_amount: Money,
    ) -> Self {
        OrderEvent::OrderConfirmed(OrderConfirmedData {
            order_id,
            confirmation_id: confirmation_id.into(),
            supplier_id: supplier_id.into(),
            total_amount,
            confirmed_at: Utc::now(),
        })
    }

    pub fn cancelled(order_id: OrderId, reason: impl Into<String>) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            order_id,
            reason: reason.into(),
            cancelled_at: Utc::now(),
        })
    }

    pub fn failed(
        order_id: OrderId,
        reason: impl Into<String>,
        error_details: Vec<String>,
        is_retryable: bool,
    ) -> Self {
        OrderEvent::OrderFailed(OrderFailedData {
            order_id,
            reason: reason.into(),
            error_details,
            is_retryable,
            failed_at: Utc::now(),
        })
    }

    pub fn delivered(order_id: OrderId) -> Self {
        OrderEvent::OrderDelivered(OrderDeliveredData {
            order_id,
            delivered_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: OrderId,
    /// Customer reference as submitted; the validation engine checks it.
    pub customer_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderValidationStartedData {
    pub order_id: OrderId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderValidatedData {
    pub order_id: OrderId,
    pub validated_at: DateTime<Utc>,
}

/// Data attached by the enrichment coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEnrichedData {
    pub order_id: OrderId,

    /// Source-specific fields, e.g. `supplier` or `customer_tier`.
    pub enrichment_data: BTreeMap<String, serde_json::Value>,

    pub enriched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmedData {
    pub order_id: OrderId,

    /// Reference issued by the supplier for this confirmation.
    pub confirmation_id: String,

    pub supplier_id: String,
    pub total_amount: Money,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub order_id: OrderId,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFailedData {
    pub order_id: OrderId,

    /// Machine-readable reason, e.g. `validation_failed`.
    pub reason: String,

    /// Individual error messages behind the failure.
    pub error_details: Vec<String>,

    /// Whether resubmitting the order may succeed.
    pub is_retryable: bool,

    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDeliveredData {
    pub order_id: OrderId,
    pub delivered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_id() -> OrderId {
        OrderId::parse("ORD-20250101-00000001").unwrap()
    }

    #[test]
    fn event_type_and_order_id() {
        let event = OrderEvent::cancelled(order_id(), "supplier_declined");
        assert_eq!(event.event_type(), "OrderCancelled");
        assert_eq!(event.order_id(), &order_id());
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = OrderEvent::failed(
            order_id(),
            REASON_VALIDATION_FAILED,
            vec!["Customer ID is required".to_string()],
            false,
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "OrderFailed");
        assert_eq!(json["data"]["reason"], "validation_failed");
        assert_eq!(json["data"]["is_retryable"], false);

        let back: OrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn occurred_at_matches_payload_timestamp() {
        let event = OrderEvent::delivered(order_id());
        let OrderEvent::OrderDelivered(data) = &event else {
            panic!("expected OrderDelivered");
        };
        assert_eq!(event.occurred_at(), data.delivered_at);
    }
}
