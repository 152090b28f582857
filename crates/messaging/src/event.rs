//! Wire-level integration events.
//!
//! On the wire every event is a JSON object:
//!
//! ```json
//! {
//!   "id": "…", "createdAt": "…", "eventType": "OrderValidatedEvent",
//!   "source": "order-workflow", "correlationId": "…", "metadata": {},
//!   "data": { "orderId": "…", "isValid": true, … }
//! }
//! ```
//!
//! Unknown fields are ignored. An unknown `eventType` is rejected.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::CorrelationId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CodecError;

/// Topic names, one per integration event type.
pub mod topics {
    pub const ORDER_RECEIVED: &str = "order-received";
    pub const ORDER_CREATED: &str = "order-created";
    pub const ORDER_VALIDATION_STARTED: &str = "order-validation-started";
    pub const ORDER_VALIDATED: &str = "order-validated";
    pub const ORDER_ENRICHED: &str = "order-enriched";
    pub const ORDER_CONFIRMED: &str = "order-confirmed";
    pub const ORDER_CANCELLED: &str = "order-cancelled";
    pub const ORDER_FAILED: &str = "order-failed";
    pub const ORDER_DELIVERED: &str = "order-delivered";
    pub const HIGH_VALUE_ERRORS: &str = "high-value-errors";
    /// Inbound: delivery collaborators publish `OrderDeliveredEvent` here.
    pub const DELIVERY_CONFIRMED: &str = "delivery-confirmed";
}

/// Immutable wire envelope.
///
/// Fields are private; an event is built once with [`IntegrationEvent::new`]
/// and optional [`IntegrationEvent::with_metadata`] calls, then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope", into = "WireEnvelope")]
pub struct IntegrationEvent {
    id: Uuid,
    created_at: DateTime<Utc>,
    source: String,
    correlation_id: CorrelationId,
    metadata: BTreeMap<String, Value>,
    payload: IntegrationPayload,
}

impl IntegrationEvent {
    pub fn new(
        payload: IntegrationPayload,
        source: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            source: source.into(),
            correlation_id,
            metadata: BTreeMap::new(),
            payload,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn payload(&self) -> &IntegrationPayload {
        &self.payload
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    pub fn topic(&self) -> &'static str {
        self.payload.topic()
    }

    pub fn order_id(&self) -> &str {
        self.payload.order_id()
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(&WireEnvelope::from(self.clone()))?)
    }

    /// Decodes a message, distinguishing unknown event types from malformed
    /// JSON.
    pub fn from_json(raw: &str) -> Result<Self, CodecError> {
        let wire: WireEnvelope = serde_json::from_str(raw)?;
        Self::try_from(wire)
    }
}

/// The typed body of an integration event.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationPayload {
    OrderReceived(OrderReceivedData),
    OrderCreated(OrderCreatedData),
    OrderValidationStarted(OrderValidationStartedData),
    OrderValidated(OrderValidatedData),
    OrderEnriched(OrderEnrichedData),
    OrderConfirmed(OrderConfirmedData),
    OrderCancelled(OrderCancelledData),
    OrderFailed(OrderFailedData),
    OrderDelivered(OrderDeliveredData),
    HighValueError(HighValueErrorData),
}

impl IntegrationPayload {
    /// The `eventType` tag written on the wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            IntegrationPayload::OrderReceived(_) => "OrderReceivedEvent",
            IntegrationPayload::OrderCreated(_) => "OrderCreatedEvent",
            IntegrationPayload::OrderValidationStarted(_) => "OrderValidationStartedEvent",
            IntegrationPayload::OrderValidated(_) => "OrderValidatedEvent",
            IntegrationPayload::OrderEnriched(_) => "OrderEnrichedEvent",
            IntegrationPayload::OrderConfirmed(_) => "OrderConfirmedEvent",
            IntegrationPayload::OrderCancelled(_) => "OrderCancelledEvent",
            IntegrationPayload::OrderFailed(_) => "OrderFailedEvent",
            IntegrationPayload::OrderDelivered(_) => "OrderDeliveredEvent",
            IntegrationPayload::HighValueError(_) => "HighValueErrorEvent",
        }
    }

    /// Default topic the event is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            IntegrationPayload::OrderReceived(_) => topics::ORDER_RECEIVED,
            IntegrationPayload::OrderCreated(_) => topics::ORDER_CREATED,
            IntegrationPayload::OrderValidationStarted(_) => topics::ORDER_VALIDATION_STARTED,
            IntegrationPayload::OrderValidated(_) => topics::ORDER_VALIDATED,
            IntegrationPayload::OrderEnriched(_) => topics::ORDER_ENRICHED,
            IntegrationPayload::OrderConfirmed(_) => topics::ORDER_CONFIRMED,
            IntegrationPayload::OrderCancelled(_) => topics::ORDER_CANCELLED,
            IntegrationPayload::OrderFailed(_) => topics::ORDER_FAILED,
            IntegrationPayload::OrderDelivered(_) => topics::ORDER_DELIVERED,
            IntegrationPayload::HighValueError(_) => topics::HIGH_VALUE_ERRORS,
        }
    }

    pub fn order_id(&self) -> &str {
        match self {
            IntegrationPayload::OrderReceived(d) => &d.order_id,
            IntegrationPayload::OrderCreated(d) => &d.order_id,
            IntegrationPayload::OrderValidationStarted(d) => &d.order_id,
            IntegrationPayload::OrderValidated(d) => &d.order_id,
            IntegrationPayload::OrderEnriched(d) => &d.order_id,
            IntegrationPayload::OrderConfirmed(d) => &d.order_id,
            IntegrationPayload::OrderCancelled(d) => &d.order_id,
            IntegrationPayload::OrderFailed(d) => &d.order_id,
            IntegrationPayload::OrderDelivered(d) => &d.order_id,
            IntegrationPayload::HighValueError(d) => &d.order_id,
        }
    }

    fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            IntegrationPayload::OrderReceived(d) => serde_json::to_value(d),
            IntegrationPayload::OrderCreated(d) => serde_json::to_value(d),
            IntegrationPayload::OrderValidationStarted(d) => serde_json::to_value(d),
            IntegrationPayload::OrderValidated(d) => serde_json::to_value(d),
            IntegrationPayload::OrderEnriched(d) => serde_json::to_value(d),
            IntegrationPayload::OrderConfirmed(d) => serde_json::to_value(d),
            IntegrationPayload::OrderCancelled(d) => serde_json::to_value(d),
            IntegrationPayload::OrderFailed(d) => serde_json::to_value(d),
            IntegrationPayload::OrderDelivered(d) => serde_json::to_value(d),
            IntegrationPayload::HighValueError(d) => serde_json::to_value(d),
        }
    }

    fn from_value(event_type: &str, data: Value) -> Result<Self, CodecError> {
        let payload = match event_type {
            "OrderReceivedEvent" => {
                IntegrationPayload::OrderReceived(serde_json::from_value(data)?)
            }
            "OrderCreatedEvent" => IntegrationPayload::OrderCreated(serde_json::from_value(data)?),
            "OrderValidationStartedEvent" => {
                IntegrationPayload::OrderValidationStarted(serde_json::from_value(data)?)
            }
            "OrderValidatedEvent" => {
                IntegrationPayload::OrderValidated(serde_json::from_value(data)?)
            }
            "OrderEnrichedEvent" => {
                IntegrationPayload::OrderEnriched(serde_json::from_value(data)?)
            }
            "OrderConfirmedEvent" => {
                IntegrationPayload::OrderConfirmed(serde_json::from_value(data)?)
            }
            "OrderCancelledEvent" => {
                IntegrationPayload::OrderCancelled(serde_json::from_value(data)?)
            }
            "OrderFailedEvent" => IntegrationPayload::OrderFailed(serde_json::from_value(data)?),
            "OrderDeliveredEvent" => {
                IntegrationPayload::OrderDelivered(serde_json::from_value(data)?)
            }
            "HighValueErrorEvent" => {
                IntegrationPayload::HighValueError(serde_json::from_value(data)?)
            }
            other => return Err(CodecError::UnrecognizedEventType(other.to_string())),
        };
        Ok(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceivedData {
    pub order_id: String,
    pub customer_id: String,
    pub received_at: DateTime<Utc>,
    pub source_system: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedData {
    pub order_id: String,
    pub customer_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderValidationStartedData {
    pub order_id: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderValidatedData {
    pub order_id: String,
    pub is_valid: bool,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEnrichedData {
    pub order_id: String,
    #[serde(default)]
    pub enrichment_data: BTreeMap<String, Value>,
    pub enriched_at: DateTime<Utc>,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmedData {
    pub order_id: String,
    pub confirmation_id: String,
    #[serde(default)]
    pub supplier_id: String,
    pub total_amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub confirmed_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelledData {
    pub order_id: String,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFailedData {
    pub order_id: String,
    pub failure_reason: String,
    #[serde(default)]
    pub error_details: Vec<String>,
    pub failed_at: DateTime<Utc>,
    #[serde(default)]
    pub is_retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDeliveredData {
    pub order_id: String,
    pub delivered_at: DateTime<Utc>,
}

/// Full context of a failure on a high-value or high-tier order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighValueErrorData {
    pub order_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub customer_email: String,
    pub error_category: String,
    pub error_message: String,
    #[serde(default)]
    pub technical_details: String,
    pub order_value: Decimal,
    pub customer_tier: String,
    pub error_occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    pub processing_stage: String,
    #[serde(default)]
    pub context_data: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    id: Uuid,
    created_at: DateTime<Utc>,
    event_type: String,
    #[serde(default)]
    source: String,
    correlation_id: String,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
    data: Value,
}

impl TryFrom<WireEnvelope> for IntegrationEvent {
    type Error = CodecError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let payload = IntegrationPayload::from_value(&wire.event_type, wire.data)?;
        Ok(Self {
            id: wire.id,
            created_at: wire.created_at,
            source: wire.source,
            correlation_id: CorrelationId::parse(wire.correlation_id)?,
            metadata: wire.metadata,
            payload,
        })
    }
}

impl From<IntegrationEvent> for WireEnvelope {
    fn from(event: IntegrationEvent) -> Self {
        // Data structs hold only strings, numbers and maps with string keys,
        // so conversion to a JSON value cannot fail.
        let data = event.payload.to_value().unwrap_or(Value::Null);
        Self {
            id: event.id,
            created_at: event.created_at,
            event_type: event.payload.event_type().to_string(),
            source: event.source,
            correlation_id: event.correlation_id.as_str().to_string(),
            metadata: event.metadata,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delivered(order_id: &str) -> IntegrationEvent {
        IntegrationEvent::new(
            IntegrationPayload::OrderDelivered(OrderDeliveredData {
                order_id: order_id.to_string(),
                delivered_at: Utc::now(),
            }),
            "courier",
            CorrelationId::parse("corr-1").unwrap(),
        )
    }

    #[test]
    fn test_wire_shape_is_camel_case_with_data_body() {
        let event = delivered("ORD-1").with_metadata("attempt", 1);
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(value["eventType"], "OrderDeliveredEvent");
        assert_eq!(value["source"], "courier");
        assert_eq!(value["correlationId"], "corr-1");
        assert_eq!(value["metadata"]["attempt"], 1);
        assert_eq!(value["data"]["orderId"], "ORD-1");
        assert!(value["createdAt"].is_string());
    }

    #[test]
    fn test_decode_preserves_envelope() {
        let event = delivered("ORD-1");
        let decoded = IntegrationEvent::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.topic(), topics::ORDER_DELIVERED);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let raw = json!({
            "id": Uuid::new_v4(),
            "createdAt": "2025-01-01T00:00:00Z",
            "eventType": "OrderCancelledEvent",
            "source": "api",
            "correlationId": "c",
            "schemaVersion": 3,
            "data": { "orderId": "ORD-1", "reason": "customer", "cancelledAt": "2025-01-01T00:00:00Z", "extra": true }
        });

        let event = IntegrationEvent::from_json(&raw.to_string()).unwrap();
        assert_eq!(event.event_type(), "OrderCancelledEvent");
        assert_eq!(event.order_id(), "ORD-1");
        assert!(event.metadata().is_empty());
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let raw = json!({
            "id": Uuid::new_v4(),
            "createdAt": "2025-01-01T00:00:00Z",
            "eventType": "OrderTeleportedEvent",
            "correlationId": "c",
            "data": { "orderId": "ORD-1" }
        });

        let err = IntegrationEvent::from_json(&raw.to_string()).unwrap_err();
        assert!(matches!(err, CodecError::UnrecognizedEventType(t) if t == "OrderTeleportedEvent"));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = IntegrationEvent::from_json("{not json").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_blank_correlation_id_is_rejected() {
        let raw = json!({
            "id": Uuid::new_v4(),
            "createdAt": "2025-01-01T00:00:00Z",
            "eventType": "OrderDeliveredEvent",
            "correlationId": "",
            "data": { "orderId": "ORD-1", "deliveredAt": "2025-01-01T00:00:00Z" }
        });

        let err = IntegrationEvent::from_json(&raw.to_string()).unwrap_err();
        assert!(matches!(err, CodecError::InvalidId(_)));
    }

    #[test]
    fn test_amounts_travel_as_decimal_strings() {
        let event = IntegrationEvent::new(
            IntegrationPayload::OrderConfirmed(OrderConfirmedData {
                order_id: "ORD-1".to_string(),
                confirmation_id: "C-1".to_string(),
                supplier_id: "ACME".to_string(),
                total_amount: Decimal::new(10000, 2),
                currency: "USD".to_string(),
                confirmed_at: Utc::now(),
                processed_by: "order-workflow".to_string(),
            }),
            "order-workflow",
            CorrelationId::new(),
        );

        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["data"]["totalAmount"], "100.00");
        assert_eq!(value["data"]["currency"], "USD");
    }
}
