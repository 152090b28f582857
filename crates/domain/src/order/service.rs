//! Order service: the single write path for order lifecycle transitions.

use std::collections::BTreeMap;

use common::{CorrelationId, OrderId};
use event_store::EventStore;

use crate::aggregate::DomainEvent;
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::validation::ValidationResult;

use super::{Money, Order, OrderError, OrderEvent};

impl From<OrderError> for DomainError {
    fn from(e: OrderError) -> Self {
        DomainError::Order(e)
    }
}

/// Result of recording an event produced elsewhere.
#[derive(Debug)]
pub enum RecordOutcome {
    Recorded(CommandResult<Order>),
    /// The event was already in the order's log; nothing was written.
    AlreadyRecorded(Order),
}

/// High-level API over the order command handler.
///
/// Every method loads the order, checks the transition, appends with an
/// optimistic version check and logs the resulting state change.
pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    /// Returns the order, or None if it has never been created.
    pub async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }

    pub async fn require_order(&self, order_id: &OrderId) -> Result<Order, DomainError> {
        self.get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::OrderNotFound(order_id.clone()))
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn create_order(
        &self,
        order_id: &OrderId,
        customer_id: &str,
        correlation_id: &CorrelationId,
    ) -> Result<CommandResult<Order>, DomainError> {
        let id = order_id.clone();
        self.run(order_id, correlation_id, |order| order.create(id, customer_id))
            .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn start_validation(
        &self,
        order_id: &OrderId,
        correlation_id: &CorrelationId,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.run(order_id, correlation_id, |order| order.start_validation())
            .await
    }

    #[tracing::instrument(skip(self, result), fields(order_id = %order_id, is_valid = result.is_valid()))]
    pub async fn record_validation(
        &self,
        order_id: &OrderId,
        result: &ValidationResult,
        correlation_id: &CorrelationId,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.run(order_id, correlation_id, |order| {
            order.record_validation(result)
        })
        .await
    }

    #[tracing::instrument(skip(self, enrichment_data), fields(order_id = %order_id, fields = enrichment_data.len()))]
    pub async fn enrich(
        &self,
        order_id: &OrderId,
        enrichment_data: BTreeMap<String, serde_json::Value>,
        correlation_id: &CorrelationId,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.run(order_id, correlation_id, |order| order.enrich(enrichment_data))
            .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn confirm(
        &self,
        order_id: &OrderId,
        confirmation_id: &str,
        supplier_id: &str,
        total_amount: Money,
        correlation_id: &CorrelationId,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.run(order_id, correlation_id, |order| {
            order.confirm(confirmation_id, supplier_id, total_amount)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel(
        &self,
        order_id: &OrderId,
        reason: &str,
        correlation_id: &CorrelationId,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.run(order_id, correlation_id, |order| order.cancel(reason))
            .await
    }

    #[tracing::instrument(skip(self, error_details), fields(order_id = %order_id))]
    pub async fn fail(
        &self,
        order_id: &OrderId,
        reason: &str,
        error_details: Vec<String>,
        is_retryable: bool,
        correlation_id: &CorrelationId,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.run(order_id, correlation_id, |order| {
            order.fail(reason, error_details, is_retryable)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_delivered(
        &self,
        order_id: &OrderId,
        correlation_id: &CorrelationId,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.run(order_id, correlation_id, |order| order.mark_delivered())
            .await
    }

    /// Records an event decoded from another service.
    ///
    /// Redelivery of an event already in the log is acknowledged without a
    /// write; anything else must be a legal transition.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id(), event_type = event.event_type()))]
    pub async fn record_event(
        &self,
        event: OrderEvent,
        correlation_id: &CorrelationId,
    ) -> Result<RecordOutcome, DomainError> {
        let order_id = event.order_id().clone();
        let result = self
            .run(&order_id, correlation_id, |order| {
                if order.contains(&event) {
                    return Ok(vec![]);
                }
                order.check(&event)?;
                Ok(vec![event])
            })
            .await?;

        if result.events.is_empty() {
            tracing::debug!("event already recorded");
            Ok(RecordOutcome::AlreadyRecorded(result.aggregate))
        } else {
            Ok(RecordOutcome::Recorded(result))
        }
    }

    async fn run<F>(
        &self,
        order_id: &OrderId,
        correlation_id: &CorrelationId,
        command_fn: F,
    ) -> Result<CommandResult<Order>, DomainError>
    where
        F: FnOnce(&Order) -> Result<Vec<OrderEvent>, OrderError>,
    {
        let result = self
            .handler
            .execute(order_id, correlation_id, command_fn)
            .await
            .inspect_err(|e| {
                if e.is_invalid_transition() {
                    tracing::error!(order_id = %order_id, error = %e, "rejected order transition");
                }
            })?;

        if let (Some(event), Some(to)) = (result.events.last(), result.aggregate.state()) {
            let from = result
                .aggregate
                .previous_state()
                .map_or("None", |s| s.as_str());
            tracing::info!(
                order_id = %order_id,
                correlation_id = %correlation_id,
                event_type = event.event_type(),
                from,
                to = to.as_str(),
                version = %result.new_version,
                "order transitioned"
            );
            metrics::counter!("order_transitions_total", "from" => from, "to" => to.as_str())
                .increment(1);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderState;
    use event_store::InMemoryEventStore;

    fn order_id() -> OrderId {
        OrderId::parse("ORD-20250101-0000BEEF").unwrap()
    }

    async fn created_service() -> OrderService<InMemoryEventStore> {
        let service = OrderService::new(InMemoryEventStore::new());
        service
            .create_order(
                &order_id(),
                "CUST-001",
                &CorrelationId::new(),
            )
            .await
            .unwrap();
        service
    }

    #[tokio::test]
    async fn record_event_is_idempotent() {
        let service = created_service().await;
        let correlation = CorrelationId::new();
        let event = OrderEvent::validation_started(order_id());

        let first = service
            .record_event(event.clone(), &correlation)
            .await
            .unwrap();
        assert!(matches!(first, RecordOutcome::Recorded(_)));

        let second = service.record_event(event, &correlation).await.unwrap();
        let RecordOutcome::AlreadyRecorded(order) = second else {
            panic!("expected duplicate");
        };
        assert_eq!(order.events().len(), 2);
        assert_eq!(order.state(), Some(OrderState::ValidationStarted));
    }

    #[tokio::test]
    async fn record_event_rejects_illegal_transition() {
        let service = created_service().await;
        let event = OrderEvent::delivered(order_id());

        let err = service
            .record_event(event, &CorrelationId::new())
            .await
            .unwrap_err();

        assert!(err.is_invalid_transition());
        let order = service.require_order(&order_id()).await.unwrap();
        assert_eq!(order.state(), Some(OrderState::Received));
    }

    #[tokio::test]
    async fn require_order_reports_missing() {
        let service = OrderService::new(InMemoryEventStore::new());
        assert!(matches!(
            service.require_order(&order_id()).await,
            Err(DomainError::OrderNotFound(_))
        ));
    }
}
