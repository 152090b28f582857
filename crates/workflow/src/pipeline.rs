//! The order pipeline: one method per processing stage.
//!
//! Each stage loads the order, checks it is where the stage expects it,
//! calls its collaborators and appends the resulting transition. Appended
//! events are then published as integration events so the next stage can
//! pick them up. A stage that finds the order already past its step
//! acknowledges without writing, which makes every stage safe under
//! redelivery.
//!
//! Integration events go through an outbox. An event the bus refuses stays
//! queued, in order, and is sent by the next stage run or
//! [`OrderPipeline::flush_outbox`], so a transition is never left
//! unannounced once it is in the log.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{CorrelationId, OrderId};
use domain::order::{REASON_ENRICHMENT_SOURCE_UNAVAILABLE, REASON_VALIDATION_FAILED};
use domain::{
    CommandResult, Currency, DomainError, DomainEvent, Money, Order, OrderError, OrderEvent,
    OrderPayload, OrderRecord, OrderRecordStore, OrderService, OrderState, RecordOutcome,
    ValidatedOrder, validate_order,
};
use event_store::EventStore;
use messaging::{
    IntegrationEvent, IntegrationPayload, MessageBus, MessageBusExt, OrderReceivedData,
    to_integration_event,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::enrichment::{
    EnrichmentCoordinator, EnrichmentOutcome, EnrichmentPolicy, EnrichmentRequest,
    EnrichmentSource, WARNINGS_KEY,
};
use crate::error::{FailureClass, PipelineError, Result};
use crate::escalation::{CustomerContext, EscalationPolicy, ProcessingFailure, classify};
use crate::metrics;
use crate::retry::{IsTransient, RetryPolicy, RetryResult, retry_on_transient};
use crate::supplier::{SupplierDecision, SupplierGateway};

/// Stage names, used as log fields and metric labels.
pub mod stage {
    pub const INTAKE: &str = "intake";
    pub const VALIDATION: &str = "validation";
    pub const ENRICHMENT: &str = "enrichment";
    pub const CONFIRMATION: &str = "confirmation";
    pub const DELIVERY: &str = "delivery";
    pub const ESCALATION: &str = "escalation";
}

/// Failure reason recorded when the supplier could not be reached.
pub const REASON_SUPPLIER_UNAVAILABLE: &str = "supplier_unavailable";

/// Failure reason recorded when a store stayed down past the retry policy.
pub const REASON_INFRASTRUCTURE_UNAVAILABLE: &str = "infrastructure_unavailable";

/// Supplier used when enrichment did not name one.
pub const UNASSIGNED_SUPPLIER: &str = "unassigned";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Name stamped on every published event.
    pub source: String,
    /// Retry policy for store and supplier calls.
    pub retry: RetryPolicy,
    pub enrichment: EnrichmentPolicy,
    pub escalation: EscalationPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: "order-workflow".to_string(),
            retry: RetryPolicy::default(),
            enrichment: EnrichmentPolicy::default(),
            escalation: EscalationPolicy::default(),
        }
    }
}

/// What a stage did with the order it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// A transition was appended; the order is now in this state.
    Advanced(OrderState),
    /// The order was already past this stage. Nothing was written.
    Duplicate(Option<OrderState>),
    /// The stage's results arrived after the order moved on and were
    /// dropped.
    Discarded(Option<OrderState>),
}

/// The customer and value a failure is judged on for escalation.
struct Subject<'a> {
    customer_id: &'a str,
    email: Option<&'a str>,
    value: Money,
    enrichment: &'a BTreeMap<String, Value>,
}

impl<'a> Subject<'a> {
    fn from_record(record: &'a OrderRecord, enrichment: &'a BTreeMap<String, Value>) -> Self {
        Self {
            customer_id: record.payload.customer_id.as_str(),
            email: record.payload.customer_email.as_deref(),
            value: order_value(&record.payload),
            enrichment,
        }
    }

    /// Falls back to what the event log knows when the record is out of
    /// reach. The order value is then unknown and counts as zero.
    fn from_order(order: &'a Order, record: Option<&'a OrderRecord>) -> Self {
        match record {
            Some(record) => Self::from_record(record, order.enrichment_data()),
            None => Self {
                customer_id: order.customer_id().unwrap_or_default(),
                email: None,
                value: Money::zero(),
                enrichment: order.enrichment_data(),
            },
        }
    }
}

/// Drives orders through validation, enrichment and confirmation.
pub struct OrderPipeline<S: EventStore> {
    orders: OrderService<S>,
    records: Arc<dyn OrderRecordStore>,
    bus: Arc<dyn MessageBus>,
    outbox: Mutex<VecDeque<IntegrationEvent>>,
    enrichment: EnrichmentCoordinator,
    supplier: Arc<dyn SupplierGateway>,
    config: PipelineConfig,
}

impl<S: EventStore> OrderPipeline<S> {
    pub fn new(
        store: S,
        records: Arc<dyn OrderRecordStore>,
        bus: Arc<dyn MessageBus>,
        sources: Vec<Arc<dyn EnrichmentSource>>,
        supplier: Arc<dyn SupplierGateway>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            orders: OrderService::new(store),
            records,
            bus,
            outbox: Mutex::new(VecDeque::new()),
            enrichment: EnrichmentCoordinator::new(sources, config.enrichment.clone()),
            supplier,
            config,
        }
    }

    pub fn orders(&self) -> &OrderService<S> {
        &self.orders
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Sends events the bus refused earlier. Returns how many are still
    /// waiting.
    pub async fn flush_outbox(&self) -> usize {
        let mut outbox = self.outbox.lock().await;
        self.send_pending(&mut outbox).await
    }

    /// Accepts a submission: stores the record, creates the order and
    /// announces it.
    #[instrument(skip(self, payload), fields(correlation_id = %correlation_id))]
    pub async fn receive(
        &self,
        payload: OrderPayload,
        source_system: &str,
        correlation_id: &CorrelationId,
    ) -> Result<OrderId> {
        let started = Instant::now();
        let order_id = OrderId::new();
        let record = OrderRecord {
            order_id: order_id.clone(),
            payload,
            received_at: Utc::now(),
            source_system: source_system.to_string(),
            correlation_id: correlation_id.clone(),
        };

        self.with_retry(|| async {
            self.records
                .save(record.clone())
                .await
                .map_err(PipelineError::from)
        })
        .await?;
        let result = self
            .orders
            .create_order(&order_id, &record.payload.customer_id, correlation_id)
            .await?;
        metrics::order_received();

        let received = IntegrationEvent::new(
            IntegrationPayload::OrderReceived(OrderReceivedData {
                order_id: order_id.to_string(),
                customer_id: record.payload.customer_id.clone(),
                received_at: record.received_at,
                source_system: record.source_system.clone(),
            }),
            self.config.source.as_str(),
            correlation_id.clone(),
        );
        let mut events = vec![received];
        events.extend(self.integration_events(&result.events, correlation_id));
        self.publish(events).await;

        tracing::info!(order_id = %order_id, source_system, "order received");
        metrics::stage_duration(stage::INTAKE, started);
        Ok(order_id)
    }

    /// Runs the validation engine over the stored submission and records
    /// the verdict. A rejected order may escalate.
    #[instrument(skip(self), fields(order_id = %order_id, correlation_id = %correlation_id))]
    pub async fn validate(
        &self,
        order_id: &OrderId,
        correlation_id: &CorrelationId,
    ) -> Result<StageOutcome> {
        self.flush_outbox().await;
        let outcome = self.run_validation(order_id, correlation_id).await;
        self.recover(stage::VALIDATION, order_id, outcome, correlation_id)
            .await
    }

    /// Calls every enrichment source and records the merged result, or
    /// fails the order when a required source is down.
    #[instrument(skip(self), fields(order_id = %order_id, correlation_id = %correlation_id))]
    pub async fn enrich(
        &self,
        order_id: &OrderId,
        correlation_id: &CorrelationId,
    ) -> Result<StageOutcome> {
        self.flush_outbox().await;
        let outcome = self.run_enrichment(order_id, correlation_id).await;
        self.recover(stage::ENRICHMENT, order_id, outcome, correlation_id)
            .await
    }

    /// Asks the supplier to confirm an enriched order. A decline cancels
    /// the order; an unreachable supplier fails it.
    #[instrument(skip(self), fields(order_id = %order_id, correlation_id = %correlation_id))]
    pub async fn confirm(
        &self,
        order_id: &OrderId,
        correlation_id: &CorrelationId,
    ) -> Result<StageOutcome> {
        self.flush_outbox().await;
        let outcome = self.run_confirmation(order_id, correlation_id).await;
        self.recover(stage::CONFIRMATION, order_id, outcome, correlation_id)
            .await
    }

    /// Cancels the order. Cancelling an already cancelled order is a no-op.
    #[instrument(skip(self), fields(order_id = %order_id, correlation_id = %correlation_id))]
    pub async fn cancel(
        &self,
        order_id: &OrderId,
        reason: &str,
        correlation_id: &CorrelationId,
    ) -> Result<StageOutcome> {
        let order = self.load_order(order_id).await?;
        if order.state() == Some(OrderState::Cancelled) {
            metrics::duplicate_delivery("cancel");
            return Ok(StageOutcome::Duplicate(order.state()));
        }

        let result = self.orders.cancel(order_id, reason, correlation_id).await?;
        self.publish_domain(&result.events, correlation_id).await;
        Ok(StageOutcome::Advanced(self.settle(order_id, &result)?))
    }

    /// Fails the order outside the normal stage flow and escalates when
    /// the policy says so.
    #[instrument(skip(self, failure), fields(order_id = %order_id, reason = %failure.reason))]
    pub async fn fail(
        &self,
        order_id: &OrderId,
        failure: &ProcessingFailure,
        correlation_id: &CorrelationId,
    ) -> Result<StageOutcome> {
        let order = self.load_order(order_id).await?;
        let record = self.load_record(order_id).await?;
        self.fail_with(
            order_id,
            Subject::from_record(&record, order.enrichment_data()),
            failure,
            correlation_id,
        )
        .await
    }

    /// Marks a confirmed order delivered.
    pub async fn mark_delivered(
        &self,
        order_id: &OrderId,
        correlation_id: &CorrelationId,
    ) -> Result<StageOutcome> {
        self.record_delivery(OrderEvent::delivered(order_id.clone()), correlation_id)
            .await
    }

    /// Records a delivery reported by another service. The same report
    /// arriving twice is acknowledged without a second write.
    #[instrument(skip(self, event), fields(order_id = %event.order_id(), correlation_id = %correlation_id))]
    pub async fn record_delivery(
        &self,
        event: OrderEvent,
        correlation_id: &CorrelationId,
    ) -> Result<StageOutcome> {
        if !matches!(event, OrderEvent::OrderDelivered(_)) {
            return Err(PipelineError::UnexpectedEvent {
                stage: stage::DELIVERY,
                event_type: event.event_type(),
            });
        }

        self.flush_outbox().await;
        let started = Instant::now();
        let order_id = event.order_id().clone();
        let outcome = match self.orders.record_event(event, correlation_id).await? {
            RecordOutcome::Recorded(result) => {
                self.publish_domain(&result.events, correlation_id).await;
                StageOutcome::Advanced(self.settle(&order_id, &result)?)
            }
            RecordOutcome::AlreadyRecorded(order) => {
                metrics::duplicate_delivery(stage::DELIVERY);
                StageOutcome::Duplicate(order.state())
            }
        };

        metrics::stage_duration(stage::DELIVERY, started);
        Ok(outcome)
    }

    async fn run_validation(
        &self,
        order_id: &OrderId,
        correlation_id: &CorrelationId,
    ) -> Result<StageOutcome> {
        let started = Instant::now();
        let order = self.load_order(order_id).await?;

        match order.state() {
            Some(OrderState::Received) => {
                let result = self
                    .orders
                    .start_validation(order_id, correlation_id)
                    .await?;
                self.publish_domain(&result.events, correlation_id).await;
            }
            // A previous attempt started validation but did not finish.
            Some(OrderState::ValidationStarted) => {}
            state => {
                return self.already_handled(
                    stage::VALIDATION,
                    order_id,
                    state,
                    OrderState::Received,
                );
            }
        }

        let record = self.load_record(order_id).await?;
        let verdict = validate_order(&record.payload);
        let result = self
            .orders
            .record_validation(order_id, &verdict, correlation_id)
            .await?;
        self.publish_domain(&result.events, correlation_id).await;
        let state = self.settle(order_id, &result)?;

        if !verdict.is_valid() {
            tracing::info!(errors = verdict.errors().len(), "order failed validation");
            let failure = ProcessingFailure {
                class: FailureClass::ValidationFailure,
                reason: REASON_VALIDATION_FAILED.to_string(),
                details: verdict.errors().to_vec(),
                technical_details: String::new(),
                retry_count: 0,
                stage: stage::VALIDATION,
                is_retryable: false,
            };
            let no_enrichment = BTreeMap::new();
            self.escalate(
                order_id,
                &Subject::from_record(&record, &no_enrichment),
                &failure,
                correlation_id,
            )
            .await;
        }

        metrics::stage_duration(stage::VALIDATION, started);
        Ok(StageOutcome::Advanced(state))
    }

    async fn run_enrichment(
        &self,
        order_id: &OrderId,
        correlation_id: &CorrelationId,
    ) -> Result<StageOutcome> {
        let started = Instant::now();
        let order = self.load_order(order_id).await?;
        if order.state() != Some(OrderState::Validated) {
            return self.already_handled(
                stage::ENRICHMENT,
                order_id,
                order.state(),
                OrderState::Validated,
            );
        }

        let record = self.load_record(order_id).await?;
        let request = EnrichmentRequest {
            order_id: order_id.clone(),
            order: ValidatedOrder::from_payload(&record.payload).map_err(DomainError::from)?,
        };
        let outcome = self.enrichment.enrich(&request).await;

        // The order may have been cancelled while the sources were called.
        let current = self.load_order(order_id).await?;
        if current.state() != Some(OrderState::Validated) {
            tracing::info!(
                state = ?current.state(),
                "order moved on during enrichment, discarding results"
            );
            return Ok(StageOutcome::Discarded(current.state()));
        }

        let outcome = match outcome {
            EnrichmentOutcome::Enriched { data, degraded } => {
                if !degraded.is_empty() {
                    tracing::warn!(
                        degraded = degraded.len(),
                        "enriched without some optional sources"
                    );
                }
                if let Some(Value::Array(warnings)) = data.get(WARNINGS_KEY) {
                    tracing::info!(warnings = warnings.len(), "enrichment raised warnings");
                }
                let result = self.orders.enrich(order_id, data, correlation_id).await?;
                self.publish_domain(&result.events, correlation_id).await;
                StageOutcome::Advanced(self.settle(order_id, &result)?)
            }
            EnrichmentOutcome::RequiredSourceUnavailable { failure, partial } => {
                let failure = ProcessingFailure {
                    class: FailureClass::TransientInfrastructureFailure,
                    reason: REASON_ENRICHMENT_SOURCE_UNAVAILABLE.to_string(),
                    details: vec![format!("{}: {}", failure.source, failure.error)],
                    technical_details: failure.error.to_string(),
                    retry_count: failure.attempts,
                    stage: stage::ENRICHMENT,
                    is_retryable: true,
                };
                self.fail_with(
                    order_id,
                    Subject::from_record(&record, &partial),
                    &failure,
                    correlation_id,
                )
                .await?
            }
        };

        metrics::stage_duration(stage::ENRICHMENT, started);
        Ok(outcome)
    }

    async fn run_confirmation(
        &self,
        order_id: &OrderId,
        correlation_id: &CorrelationId,
    ) -> Result<StageOutcome> {
        let started = Instant::now();
        let order = self.load_order(order_id).await?;
        if order.state() != Some(OrderState::Enriched) {
            return self.already_handled(
                stage::CONFIRMATION,
                order_id,
                order.state(),
                OrderState::Enriched,
            );
        }

        let record = self.load_record(order_id).await?;
        let total = ValidatedOrder::from_payload(&record.payload)
            .and_then(|validated| validated.total())
            .map_err(DomainError::from)?;
        let supplier_id = order
            .enrichment_data()
            .get("supplier")
            .and_then(Value::as_str)
            .unwrap_or(UNASSIGNED_SUPPLIER)
            .to_string();

        let call_started = Instant::now();
        let decision = retry_on_transient(&self.config.retry, |_| {
            self.supplier
                .request_confirmation(order_id, &supplier_id, total)
        })
        .await;
        let label = match &decision {
            RetryResult::Success { .. } => "ok",
            RetryResult::Exhausted { .. } => "exhausted",
            RetryResult::Permanent { .. } => "error",
        };
        metrics::external_call("supplier", label, call_started.elapsed());

        let outcome = match decision {
            RetryResult::Success {
                value: SupplierDecision::Accepted { confirmation_id },
                ..
            } => {
                let result = self
                    .orders
                    .confirm(order_id, &confirmation_id, &supplier_id, total, correlation_id)
                    .await?;
                self.publish_domain(&result.events, correlation_id).await;
                StageOutcome::Advanced(self.settle(order_id, &result)?)
            }
            RetryResult::Success {
                value: SupplierDecision::Declined { reason },
                ..
            } => {
                tracing::info!(
                    supplier_id = %supplier_id,
                    reason = %reason,
                    "supplier declined order"
                );
                let result = self.orders.cancel(order_id, &reason, correlation_id).await?;
                self.publish_domain(&result.events, correlation_id).await;
                StageOutcome::Advanced(self.settle(order_id, &result)?)
            }
            RetryResult::Exhausted { error, attempts }
            | RetryResult::Permanent { error, attempts } => {
                let failure = ProcessingFailure {
                    class: FailureClass::TransientInfrastructureFailure,
                    reason: REASON_SUPPLIER_UNAVAILABLE.to_string(),
                    details: vec![format!("supplier {supplier_id}: {error}")],
                    technical_details: error.to_string(),
                    retry_count: attempts,
                    stage: stage::CONFIRMATION,
                    is_retryable: true,
                };
                self.fail_with(
                    order_id,
                    Subject::from_record(&record, order.enrichment_data()),
                    &failure,
                    correlation_id,
                )
                .await?
            }
        };

        metrics::stage_duration(stage::CONFIRMATION, started);
        Ok(outcome)
    }

    /// Turns a store outage that outlasted the retry policy into a
    /// retryable `OrderFailed`, so the message is acknowledged rather than
    /// redelivered. Concurrency conflicts, and outages that also keep the
    /// failure from being written, go back to the bus.
    async fn recover(
        &self,
        stage_name: &'static str,
        order_id: &OrderId,
        outcome: Result<StageOutcome>,
        correlation_id: &CorrelationId,
    ) -> Result<StageOutcome> {
        let error = match outcome {
            Err(error) if error.is_transient() && !error.is_conflict() => error,
            other => return other,
        };

        let order = match self.load_order(order_id).await {
            Ok(order) => order,
            Err(load_error) => {
                tracing::error!(
                    order_id = %order_id,
                    stage = stage_name,
                    error = %load_error,
                    "event store unavailable, cannot record failure"
                );
                return Err(error);
            }
        };
        match order.state() {
            Some(OrderState::ValidationStarted | OrderState::Validated | OrderState::Enriched) => {}
            Some(state) if state.is_settled() => return Ok(StageOutcome::Duplicate(Some(state))),
            _ => return Err(error),
        }

        let record = self.records.get(order_id).await.ok().flatten();
        let failure = ProcessingFailure {
            class: FailureClass::TransientInfrastructureFailure,
            reason: REASON_INFRASTRUCTURE_UNAVAILABLE.to_string(),
            details: vec![format!("{stage_name}: {error}")],
            technical_details: error.to_string(),
            retry_count: self.config.retry.max_attempts,
            stage: stage_name,
            is_retryable: true,
        };
        match self
            .fail_with(
                order_id,
                Subject::from_order(&order, record.as_ref()),
                &failure,
                correlation_id,
            )
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(fail_error) => {
                tracing::error!(
                    order_id = %order_id,
                    stage = stage_name,
                    error = %fail_error,
                    "could not record failure after outage"
                );
                Err(error)
            }
        }
    }

    async fn fail_with(
        &self,
        order_id: &OrderId,
        subject: Subject<'_>,
        failure: &ProcessingFailure,
        correlation_id: &CorrelationId,
    ) -> Result<StageOutcome> {
        tracing::warn!(
            order_id = %order_id,
            stage = failure.stage,
            reason = %failure.reason,
            retry_count = failure.retry_count,
            "failing order"
        );
        let result = self
            .orders
            .fail(
                order_id,
                &failure.reason,
                failure.details.clone(),
                failure.is_retryable,
                correlation_id,
            )
            .await?;
        self.publish_domain(&result.events, correlation_id).await;
        let state = self.settle(order_id, &result)?;

        self.escalate(order_id, &subject, failure, correlation_id).await;
        Ok(StageOutcome::Advanced(state))
    }

    /// Publishes a high-value error event when the failure meets the
    /// escalation policy. Returns whether one was raised.
    async fn escalate(
        &self,
        order_id: &OrderId,
        subject: &Subject<'_>,
        failure: &ProcessingFailure,
        correlation_id: &CorrelationId,
    ) -> bool {
        let customer = CustomerContext::from_enrichment(
            subject.customer_id,
            subject.email,
            subject.enrichment,
        );

        let Some(data) = classify(
            &self.config.escalation,
            order_id,
            subject.value,
            &customer,
            failure,
        ) else {
            tracing::debug!(
                order_value = %subject.value,
                tier = %customer.tier,
                "failure below escalation policy"
            );
            return false;
        };

        tracing::warn!(
            order_id = %order_id,
            order_value = %subject.value,
            tier = %customer.tier,
            category = %data.error_category,
            "escalating high-value order failure"
        );
        let event = IntegrationEvent::new(
            IntegrationPayload::HighValueError(data),
            self.config.source.as_str(),
            correlation_id.clone(),
        );
        self.publish([event]).await;
        metrics::escalation_raised();
        true
    }

    fn integration_events(
        &self,
        events: &[OrderEvent],
        correlation_id: &CorrelationId,
    ) -> Vec<IntegrationEvent> {
        events
            .iter()
            .map(|event| to_integration_event(event, correlation_id, &self.config.source))
            .collect()
    }

    async fn publish_domain(&self, events: &[OrderEvent], correlation_id: &CorrelationId) {
        self.publish(self.integration_events(events, correlation_id))
            .await;
    }

    /// Queues `events` behind anything still unsent, then sends as many as
    /// the bus accepts.
    async fn publish(&self, events: impl IntoIterator<Item = IntegrationEvent>) {
        let mut outbox = self.outbox.lock().await;
        outbox.extend(events);
        self.send_pending(&mut outbox).await;
    }

    async fn send_pending(&self, outbox: &mut VecDeque<IntegrationEvent>) -> usize {
        while let Some(event) = outbox.front() {
            if let Err(e) = self.bus.publish_event(event).await {
                tracing::warn!(
                    event_type = event.event_type(),
                    order_id = event.order_id(),
                    pending = outbox.len(),
                    error = %e,
                    "publish failed, keeping event in outbox"
                );
                break;
            }
            outbox.pop_front();
        }
        metrics::outbox_pending(outbox.len());
        outbox.len()
    }

    async fn load_order(&self, order_id: &OrderId) -> Result<Order> {
        self.with_retry(|| async {
            self.orders
                .require_order(order_id)
                .await
                .map_err(PipelineError::from)
        })
        .await
    }

    async fn load_record(&self, order_id: &OrderId) -> Result<OrderRecord> {
        self.with_retry(|| async {
            self.records
                .get(order_id)
                .await
                .map_err(PipelineError::from)
        })
        .await?
        .ok_or_else(|| PipelineError::RecordNotFound(order_id.clone()))
    }

    async fn with_retry<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_on_transient(&self.config.retry, |_| operation())
            .await
            .into_result()
    }

    /// Returns the order's new state, counting it once when it first
    /// becomes settled.
    fn settle(&self, order_id: &OrderId, result: &CommandResult<Order>) -> Result<OrderState> {
        let state = result
            .aggregate
            .state()
            .ok_or_else(|| DomainError::OrderNotFound(order_id.clone()))?;
        let was_settled = result
            .aggregate
            .previous_state()
            .is_some_and(|previous| previous.is_settled());
        if state.is_settled() && !was_settled && !result.events.is_empty() {
            metrics::order_settled(state);
        }
        Ok(state)
    }

    /// Acknowledges a redelivery for an order already past `expected`. An
    /// order that has not reached `expected` yet cannot take this stage's
    /// transition, which is reported as an invalid transition.
    fn already_handled(
        &self,
        stage_name: &'static str,
        order_id: &OrderId,
        state: Option<OrderState>,
        expected: OrderState,
    ) -> Result<StageOutcome> {
        match state {
            Some(current) if current.rank() > expected.rank() || current.is_terminal() => {
                tracing::debug!(
                    order_id = %order_id,
                    stage = stage_name,
                    state = %current,
                    "order already past stage, acknowledging"
                );
                metrics::duplicate_delivery(stage_name);
                Ok(StageOutcome::Duplicate(state))
            }
            _ => Err(DomainError::Order(OrderError::InvalidTransition {
                from: state,
                event_type: stage_event_type(stage_name),
            })
            .into()),
        }
    }
}

/// The event a stage appends on success.
fn stage_event_type(stage_name: &str) -> &'static str {
    match stage_name {
        stage::VALIDATION => "OrderValidationStarted",
        stage::ENRICHMENT => "OrderEnriched",
        stage::CONFIRMATION => "OrderConfirmed",
        _ => "OrderDelivered",
    }
}

/// Order value as submitted, zero when the items do not add up to an
/// amount.
fn order_value(payload: &OrderPayload) -> Money {
    payload
        .total_value()
        .and_then(|total| Money::from_decimal(total.round_dp(2), Currency::Usd).ok())
        .unwrap_or_else(Money::zero)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn payload(items: &[(i64, &str)]) -> OrderPayload {
        OrderPayload {
            customer_id: "CUST-1".to_string(),
            items: items
                .iter()
                .enumerate()
                .map(|(i, (quantity, price))| domain::OrderItemPayload {
                    product_id: format!("P-{i}"),
                    quantity: *quantity,
                    unit_price: price.parse::<Decimal>().expect("price"),
                })
                .collect(),
            delivery_date: None,
            notes: None,
            customer_email: None,
        }
    }

    #[test]
    fn order_value_sums_items() {
        let value = order_value(&payload(&[(2, "25.00"), (1, "50.00")]));
        assert_eq!(value, Money::from_dollars(100));
    }

    #[test]
    fn order_value_of_unpriceable_payload_is_zero() {
        assert_eq!(order_value(&payload(&[(1, "-10.00")])), Money::zero());
        assert_eq!(order_value(&payload(&[])), Money::zero());
    }

    #[test]
    fn stage_event_types_name_the_appended_event() {
        assert_eq!(stage_event_type(stage::ENRICHMENT), "OrderEnriched");
        assert_eq!(stage_event_type(stage::CONFIRMATION), "OrderConfirmed");
    }
}
