//! Order aggregate implementation.

use std::collections::BTreeMap;

use common::OrderId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, ApplyOutcome, DomainEvent};
use crate::validation::ValidationResult;

use super::{
    Money, OrderError, OrderEvent, OrderState, REASON_VALIDATION_FAILED,
    events::{OrderConfirmedData, OrderFailedData},
};

/// Order aggregate root.
///
/// The aggregate owns the order's event log; its state is always the fold of
/// that log. Command methods never mutate: they return the event that would
/// be recorded, after checking it against the transition table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<OrderId>,

    #[serde(default)]
    version: Version,

    customer_id: Option<String>,

    /// None until `OrderCreated` is applied.
    state: Option<OrderState>,

    /// State before the most recently applied event.
    #[serde(skip)]
    previous_state: Option<OrderState>,

    events: Vec<OrderEvent>,

    enrichment_data: BTreeMap<String, serde_json::Value>,

    confirmation: Option<OrderConfirmedData>,

    failure: Option<OrderFailedData>,

    cancellation_reason: Option<String>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<&OrderId> {
        self.id.as_ref()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) -> Result<ApplyOutcome, Self::Error> {
        if self.events.last() == Some(&event) {
            return Ok(ApplyOutcome::Replayed);
        }

        let next = self.check(&event)?;

        match &event {
            OrderEvent::OrderCreated(data) => {
                self.id = Some(data.order_id.clone());
                self.customer_id = Some(data.customer_id.clone());
            }
            OrderEvent::OrderEnriched(data) => {
                self.enrichment_data = data.enrichment_data.clone();
            }
            OrderEvent::OrderConfirmed(data) => {
                self.confirmation = Some(data.clone());
            }
            OrderEvent::OrderCancelled(data) => {
                self.cancellation_reason = Some(data.reason.clone());
            }
            OrderEvent::OrderFailed(data) => {
                self.failure = Some(data.clone());
            }
            OrderEvent::OrderValidationStarted(_)
            | OrderEvent::OrderValidated(_)
            | OrderEvent::OrderDelivered(_) => {}
        }

        self.previous_state = self.state;
        self.state = Some(next);
        self.events.push(event);
        Ok(ApplyOutcome::Applied)
    }
}

// Command methods
impl Order {
    /// Records the creation of a new order.
    pub fn create(
        &self,
        order_id: OrderId,
        customer_id: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyCreated);
        }
        self.accept(OrderEvent::created(order_id, customer_id))
    }

    pub fn start_validation(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.accept(OrderEvent::validation_started(
            self.require_id("OrderValidationStarted")?,
        ))
    }

    /// Records the validation verdict: `OrderValidated` when the payload
    /// passed, otherwise a non-retryable `OrderFailed` carrying every error.
    pub fn record_validation(
        &self,
        result: &ValidationResult,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let event_type = if result.is_valid() {
            "OrderValidated"
        } else {
            "OrderFailed"
        };
        let id = self.require_id(event_type)?;
        let event = if result.is_valid() {
            OrderEvent::validated(id)
        } else {
            OrderEvent::failed(id, REASON_VALIDATION_FAILED, result.errors().to_vec(), false)
        };
        self.accept(event)
    }

    pub fn enrich(
        &self,
        enrichment_data: BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.accept(OrderEvent::enriched(
            self.require_id("OrderEnriched")?,
            enrichment_data,
        ))
    }

    pub fn confirm(
        &self,
        confirmation_id: impl Into<String>,
        supplier_id: impl Into<String>,
        total_amount: Money,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.accept(OrderEvent::confirmed(
            self.require_id("OrderConfirmed")?,
            confirmation_id,
            supplier_id,
            total_amount,
        ))
    }

    pub fn cancel(&self, reason: impl Into<String>) -> Result<Vec<OrderEvent>, OrderError> {
        self.accept(OrderEvent::cancelled(
            self.require_id("OrderCancelled")?,
            reason,
        ))
    }

    pub fn fail(
        &self,
        reason: impl Into<String>,
        error_details: Vec<String>,
        is_retryable: bool,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.accept(OrderEvent::failed(
            self.require_id("OrderFailed")?,
            reason,
            error_details,
            is_retryable,
        ))
    }

    pub fn mark_delivered(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.accept(OrderEvent::delivered(
            self.require_id("OrderDelivered")?,
        ))
    }

    /// Checks that `event` targets this order and is legal from the current state.
    pub fn check(&self, event: &OrderEvent) -> Result<OrderState, OrderError> {
        if let Some(id) = &self.id
            && event.order_id() != id
        {
            return Err(OrderError::OrderMismatch {
                expected: id.clone(),
                actual: event.order_id().clone(),
            });
        }

        OrderState::transition(self.state, event).ok_or(OrderError::InvalidTransition {
            from: self.state,
            event_type: event.event_type(),
        })
    }

    fn accept(&self, event: OrderEvent) -> Result<Vec<OrderEvent>, OrderError> {
        self.check(&event)?;
        Ok(vec![event])
    }

    fn require_id(&self, event_type: &'static str) -> Result<OrderId, OrderError> {
        self.id.clone().ok_or(OrderError::InvalidTransition {
            from: None,
            event_type,
        })
    }
}

// Query methods
impl Order {
    /// Rebuilds an order from its log.
    pub fn replay(events: impl IntoIterator<Item = OrderEvent>) -> Result<Self, OrderError> {
        let mut order = Order::default();
        order.apply_events(events)?;
        Ok(order)
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer_id.as_deref()
    }

    pub fn state(&self) -> Option<OrderState> {
        self.state
    }

    pub fn previous_state(&self) -> Option<OrderState> {
        self.previous_state
    }

    /// The order's event log, oldest first.
    pub fn events(&self) -> &[OrderEvent] {
        &self.events
    }

    /// True if `event` is already somewhere in the log.
    pub fn contains(&self, event: &OrderEvent) -> bool {
        self.events.contains(event)
    }

    pub fn enrichment_data(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.enrichment_data
    }

    pub fn confirmation(&self) -> Option<&OrderConfirmedData> {
        self.confirmation.as_ref()
    }

    pub fn failure(&self) -> Option<&OrderFailedData> {
        self.failure.as_ref()
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn is_settled(&self) -> bool {
        self.state.is_some_and(|s| s.is_settled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationResult;

    fn order_id() -> OrderId {
        OrderId::parse("ORD-20250101-00000001").unwrap()
    }

    fn customer() -> &'static str {
        "CUST-001"
    }

    /// Runs `command` against the order and applies what it emits.
    fn step(
        order: &mut Order,
        command: impl FnOnce(&Order) -> Result<Vec<OrderEvent>, OrderError>,
    ) {
        for event in command(order).unwrap() {
            order.apply(event).unwrap();
        }
    }

    fn enriched_order() -> Order {
        let mut order = Order::default();
        step(&mut order, |o| o.create(order_id(), customer()));
        step(&mut order, |o| o.start_validation());
        step(&mut order, |o| o.record_validation(&ValidationResult::valid()));
        let mut data = BTreeMap::new();
        data.insert("supplier".to_string(), serde_json::json!("ACME"));
        step(&mut order, |o| o.enrich(data));
        order
    }

    #[test]
    fn happy_path_builds_five_event_log() {
        let mut order = enriched_order();
        step(&mut order, |o| o.confirm("C-1", "ACME", Money::from_cents(10_000)));

        assert_eq!(order.state(), Some(OrderState::Confirmed));
        assert_eq!(order.events().len(), 5);
        assert_eq!(order.enrichment_data()["supplier"], "ACME");
        assert_eq!(order.confirmation().unwrap().confirmation_id, "C-1");
    }

    #[test]
    fn replaying_head_event_is_noop() {
        let mut order = enriched_order();
        let head = order.events().last().cloned().unwrap();
        let len = order.events().len();

        let outcome = order.apply(head).unwrap();

        assert_eq!(outcome, ApplyOutcome::Replayed);
        assert_eq!(order.events().len(), len);
        assert_eq!(order.state(), Some(OrderState::Enriched));
    }

    #[test]
    fn confirm_from_received_is_invalid_and_leaves_state() {
        let mut order = Order::default();
        step(&mut order, |o| o.create(order_id(), customer()));

        let err = order
            .confirm("C-1", "ACME", Money::from_cents(100))
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: Some(OrderState::Received),
                event_type: "OrderConfirmed"
            }
        );

        let event = OrderEvent::confirmed(order_id(), "C-1", "ACME", Money::from_cents(100));
        assert!(order.apply(event).unwrap_err().is_invalid_transition());
        assert_eq!(order.state(), Some(OrderState::Received));
        assert_eq!(order.events().len(), 1);
    }

    #[test]
    fn failed_validation_records_errors_and_is_not_retryable() {
        let mut order = Order::default();
        step(&mut order, |o| o.create(order_id(), customer()));
        step(&mut order, |o| o.start_validation());

        let result = ValidationResult::invalid(vec!["Notes cannot exceed 1000 characters".into()]);
        step(&mut order, |o| o.record_validation(&result));

        let failure = order.failure().unwrap();
        assert_eq!(order.state(), Some(OrderState::Failed));
        assert_eq!(failure.reason, REASON_VALIDATION_FAILED);
        assert_eq!(failure.error_details.len(), 1);
        assert!(!failure.is_retryable);
    }

    #[test]
    fn cancellation_allowed_while_enrichment_in_flight() {
        let mut order = Order::default();
        step(&mut order, |o| o.create(order_id(), customer()));
        step(&mut order, |o| o.start_validation());
        step(&mut order, |o| o.record_validation(&ValidationResult::valid()));
        step(&mut order, |o| o.cancel("customer_request"));

        assert_eq!(order.state(), Some(OrderState::Cancelled));
        assert!(order.enrich(BTreeMap::new()).is_err());
    }

    #[test]
    fn delivery_only_after_confirmation() {
        let order = enriched_order();
        assert!(order.mark_delivered().is_err());
    }

    #[test]
    fn create_twice_is_rejected() {
        let mut order = Order::default();
        step(&mut order, |o| o.create(order_id(), customer()));
        assert_eq!(
            order.create(order_id(), customer()).unwrap_err(),
            OrderError::AlreadyCreated
        );
    }

    #[test]
    fn events_for_other_orders_are_rejected() {
        let mut order = Order::default();
        step(&mut order, |o| o.create(order_id(), customer()));

        let other = OrderEvent::validation_started(OrderId::parse("ORD-OTHER").unwrap());
        assert!(matches!(
            order.apply(other),
            Err(OrderError::OrderMismatch { .. })
        ));
    }

    #[test]
    fn uncreated_order_rejects_commands() {
        let order = Order::default();
        assert!(matches!(
            order.start_validation(),
            Err(OrderError::InvalidTransition { from: None, .. })
        ));
    }

    #[test]
    fn replay_rebuilds_state() {
        let order = enriched_order();
        let rebuilt = Order::replay(order.events().to_vec()).unwrap();
        assert_eq!(rebuilt.state(), order.state());
        assert_eq!(rebuilt.customer_id(), Some(customer()));
        assert_eq!(rebuilt.enrichment_data(), order.enrichment_data());
    }
}
