//! Translation between domain events and integration events.
//!
//! Encoding is total over [`OrderEvent`]. Decoding accepts every payload that
//! mirrors a domain event; `OrderReceivedEvent` and `HighValueErrorEvent`
//! exist only on the wire.

use common::{CorrelationId, OrderId};
use domain::order::{
    OrderCancelledData as DomainCancelled, OrderConfirmedData as DomainConfirmed,
    OrderCreatedData as DomainCreated, OrderDeliveredData as DomainDelivered,
    OrderEnrichedData as DomainEnriched, OrderFailedData as DomainFailed,
    OrderValidatedData as DomainValidated,
    OrderValidationStartedData as DomainValidationStarted,
};
use domain::{Currency, DomainEvent, Money, OrderEvent};

use crate::error::CodecError;
use crate::event::{
    IntegrationEvent, IntegrationPayload, OrderCancelledData, OrderConfirmedData,
    OrderCreatedData, OrderDeliveredData, OrderEnrichedData, OrderFailedData, OrderValidatedData,
    OrderValidationStartedData,
};

/// Metadata key holding the domain event name an integration event was
/// encoded from.
pub const DOMAIN_EVENT_KEY: &str = "domainEvent";

/// Wraps a domain event for publication.
pub fn to_integration_event(
    event: &OrderEvent,
    correlation_id: &CorrelationId,
    source: &str,
) -> IntegrationEvent {
    let payload = match event {
        OrderEvent::OrderCreated(d) => IntegrationPayload::OrderCreated(OrderCreatedData {
            order_id: d.order_id.to_string(),
            customer_id: d.customer_id.clone(),
            created_at: d.created_at,
        }),
        OrderEvent::OrderValidationStarted(d) => {
            IntegrationPayload::OrderValidationStarted(OrderValidationStartedData {
                order_id: d.order_id.to_string(),
                started_at: d.started_at,
            })
        }
        OrderEvent::OrderValidated(d) => IntegrationPayload::OrderValidated(OrderValidatedData {
            order_id: d.order_id.to_string(),
            is_valid: true,
            validation_errors: Vec::new(),
            validated_at: d.validated_at,
        }),
        OrderEvent::OrderEnriched(d) => IntegrationPayload::OrderEnriched(OrderEnrichedData {
            order_id: d.order_id.to_string(),
            enrichment_data: d.enrichment_data.clone(),
            enriched_at: d.enriched_at,
        }),
        OrderEvent::OrderConfirmed(d) => IntegrationPayload::OrderConfirmed(OrderConfirmedData {
            order_id: d.order_id.to_string(),
            confirmation_id: d.confirmation_id.clone(),
            supplier_id: d.supplier_id.clone(),
            total_amount: d.total_amount.to_decimal(),
            currency: d.total_amount.currency().code().to_string(),
            confirmed_at: d.confirmed_at,
            processed_by: source.to_string(),
        }),
        OrderEvent::OrderCancelled(d) => IntegrationPayload::OrderCancelled(OrderCancelledData {
            order_id: d.order_id.to_string(),
            reason: d.reason.clone(),
            cancelled_at: d.cancelled_at,
        }),
        OrderEvent::OrderFailed(d) => IntegrationPayload::OrderFailed(OrderFailedData {
            order_id: d.order_id.to_string(),
            failure_reason: d.reason.clone(),
            error_details: d.error_details.clone(),
            failed_at: d.failed_at,
            is_retryable: d.is_retryable,
        }),
        OrderEvent::OrderDelivered(d) => IntegrationPayload::OrderDelivered(OrderDeliveredData {
            order_id: d.order_id.to_string(),
            delivered_at: d.delivered_at,
        }),
    };

    IntegrationEvent::new(payload, source, correlation_id.clone())
        .with_metadata(DOMAIN_EVENT_KEY, event.event_type())
}

/// Recovers the domain event carried by an integration event.
pub fn from_integration_event(event: &IntegrationEvent) -> Result<OrderEvent, CodecError> {
    let domain_event = match event.payload() {
        IntegrationPayload::OrderReceived(_) | IntegrationPayload::HighValueError(_) => {
            return Err(CodecError::NotADomainEvent(event.event_type()));
        }
        IntegrationPayload::OrderCreated(d) => OrderEvent::OrderCreated(DomainCreated {
            order_id: OrderId::parse(&d.order_id)?,
            customer_id: d.customer_id.clone(),
            created_at: d.created_at,
        }),
        IntegrationPayload::OrderValidationStarted(d) => {
            OrderEvent::OrderValidationStarted(DomainValidationStarted {
                order_id: OrderId::parse(&d.order_id)?,
                started_at: d.started_at,
            })
        }
        IntegrationPayload::OrderValidated(d) => {
            if !d.is_valid {
                return Err(CodecError::InconsistentPayload(format!(
                    "order {} validated with isValid=false; failed validation travels as OrderFailedEvent",
                    d.order_id
                )));
            }
            OrderEvent::OrderValidated(DomainValidated {
                order_id: OrderId::parse(&d.order_id)?,
                validated_at: d.validated_at,
            })
        }
        IntegrationPayload::OrderEnriched(d) => OrderEvent::OrderEnriched(DomainEnriched {
            order_id: OrderId::parse(&d.order_id)?,
            enrichment_data: d.enrichment_data.clone(),
            enriched_at: d.enriched_at,
        }),
        IntegrationPayload::OrderConfirmed(d) => OrderEvent::OrderConfirmed(DomainConfirmed {
            order_id: OrderId::parse(&d.order_id)?,
            confirmation_id: d.confirmation_id.clone(),
            supplier_id: d.supplier_id.clone(),
            total_amount: Money::from_decimal(d.total_amount, Currency::parse(&d.currency)?)?,
            confirmed_at: d.confirmed_at,
        }),
        IntegrationPayload::OrderCancelled(d) => OrderEvent::OrderCancelled(DomainCancelled {
            order_id: OrderId::parse(&d.order_id)?,
            reason: d.reason.clone(),
            cancelled_at: d.cancelled_at,
        }),
        IntegrationPayload::OrderFailed(d) => OrderEvent::OrderFailed(DomainFailed {
            order_id: OrderId::parse(&d.order_id)?,
            reason: d.failure_reason.clone(),
            error_details: d.error_details.clone(),
            is_retryable: d.is_retryable,
            failed_at: d.failed_at,
        }),
        IntegrationPayload::OrderDelivered(d) => OrderEvent::OrderDelivered(DomainDelivered {
            order_id: OrderId::parse(&d.order_id)?,
            delivered_at: d.delivered_at,
        }),
    };
    Ok(domain_event)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::event::{HighValueErrorData, OrderReceivedData};

    fn all_domain_events() -> Vec<OrderEvent> {
        let id = OrderId::new();
        let mut enrichment = BTreeMap::new();
        enrichment.insert("supplier".to_string(), json!("ACME"));
        enrichment.insert("item_count".to_string(), json!(2));

        vec![
            OrderEvent::created(id.clone(), "CUST-001"),
            OrderEvent::validation_started(id.clone()),
            OrderEvent::validated(id.clone()),
            OrderEvent::enriched(id.clone(), enrichment),
            OrderEvent::confirmed(
                id.clone(),
                "C-1",
                "ACME",
                Money::from_cents_in(123_456, Currency::Eur),
            ),
            OrderEvent::cancelled(id.clone(), "supplier declined"),
            OrderEvent::failed(
                id.clone(),
                "validation_failed",
                vec!["Customer ID is required".to_string()],
                false,
            ),
            OrderEvent::delivered(id),
        ]
    }

    #[test]
    fn test_every_domain_event_round_trips() {
        let correlation = CorrelationId::new();
        for event in all_domain_events() {
            let wire = to_integration_event(&event, &correlation, "order-workflow");
            assert_eq!(wire.correlation_id(), &correlation);

            let decoded = from_integration_event(&wire).unwrap();
            assert_eq!(decoded, event, "round trip of {}", event.event_type());
        }
    }

    #[test]
    fn test_every_domain_event_round_trips_through_json() {
        let correlation = CorrelationId::new();
        for event in all_domain_events() {
            let wire = to_integration_event(&event, &correlation, "order-workflow");
            let json = wire.to_json().unwrap();
            let decoded =
                from_integration_event(&IntegrationEvent::from_json(&json).unwrap()).unwrap();
            assert_eq!(decoded, event);
        }
    }

    #[test]
    fn test_confirmed_carries_processed_by_and_metadata() {
        let event = OrderEvent::confirmed(OrderId::new(), "C-1", "ACME", Money::from_cents(10_000));
        let wire = to_integration_event(&event, &CorrelationId::new(), "confirmation-stage");

        match wire.payload() {
            IntegrationPayload::OrderConfirmed(d) => {
                assert_eq!(d.processed_by, "confirmation-stage");
                assert_eq!(d.total_amount.to_string(), "100.00");
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(wire.metadata()[DOMAIN_EVENT_KEY], "OrderConfirmed");
    }

    #[test]
    fn test_wire_only_events_have_no_domain_counterpart() {
        let received = IntegrationEvent::new(
            IntegrationPayload::OrderReceived(OrderReceivedData {
                order_id: "ORD-1".to_string(),
                customer_id: "CUST-1".to_string(),
                received_at: Utc::now(),
                source_system: "api".to_string(),
            }),
            "api",
            CorrelationId::new(),
        );
        assert!(matches!(
            from_integration_event(&received),
            Err(CodecError::NotADomainEvent("OrderReceivedEvent"))
        ));

        let escalation = IntegrationEvent::new(
            IntegrationPayload::HighValueError(HighValueErrorData {
                order_id: "ORD-1".to_string(),
                customer_id: "CUST-1".to_string(),
                customer_email: String::new(),
                error_category: "enrichment".to_string(),
                error_message: "down".to_string(),
                technical_details: String::new(),
                order_value: rust_decimal::Decimal::new(9_500_000, 2),
                customer_tier: "Platinum".to_string(),
                error_occurred_at: Utc::now(),
                retry_count: 3,
                processing_stage: "enrichment".to_string(),
                context_data: BTreeMap::new(),
            }),
            "order-workflow",
            CorrelationId::new(),
        );
        assert!(matches!(
            from_integration_event(&escalation),
            Err(CodecError::NotADomainEvent("HighValueErrorEvent"))
        ));
    }

    #[test]
    fn test_validated_with_is_valid_false_is_inconsistent() {
        let wire = IntegrationEvent::new(
            IntegrationPayload::OrderValidated(OrderValidatedData {
                order_id: "ORD-1".to_string(),
                is_valid: false,
                validation_errors: vec!["Items are required".to_string()],
                validated_at: Utc::now(),
            }),
            "legacy",
            CorrelationId::new(),
        );

        assert!(matches!(
            from_integration_event(&wire),
            Err(CodecError::InconsistentPayload(_))
        ));
    }

    #[test]
    fn test_confirmed_with_sub_cent_amount_is_rejected() {
        let wire = IntegrationEvent::new(
            IntegrationPayload::OrderConfirmed(OrderConfirmedData {
                order_id: "ORD-1".to_string(),
                confirmation_id: "C-1".to_string(),
                supplier_id: "ACME".to_string(),
                total_amount: rust_decimal::Decimal::new(1001, 3),
                currency: "USD".to_string(),
                confirmed_at: Utc::now(),
                processed_by: String::new(),
            }),
            "legacy",
            CorrelationId::new(),
        );

        assert!(matches!(
            from_integration_event(&wire),
            Err(CodecError::InvalidValue(_))
        ));
    }
}
