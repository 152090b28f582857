//! Bus handlers that drive the pipeline, one per consumed topic.

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use event_store::EventStore;
use messaging::{
    CodecError, EventHandler, HandlerError, IntegrationEvent, IntegrationPayload, MessageBus,
    from_integration_event, topics,
};

use crate::error::PipelineError;
use crate::metrics;
use crate::notifier::Notifier;
use crate::pipeline::{OrderPipeline, StageOutcome, stage};
use crate::retry::{RetryPolicy, RetryResult, retry_on_transient};

/// Which pipeline step a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Validate,
    Enrich,
    Confirm,
    Deliver,
}

impl Step {
    /// The topic this step consumes.
    pub fn topic(&self) -> &'static str {
        match self {
            Step::Validate => topics::ORDER_RECEIVED,
            Step::Enrich => topics::ORDER_VALIDATED,
            Step::Confirm => topics::ORDER_ENRICHED,
            Step::Deliver => topics::DELIVERY_CONFIRMED,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::Validate => stage::VALIDATION,
            Step::Enrich => stage::ENRICHMENT,
            Step::Confirm => stage::CONFIRMATION,
            Step::Deliver => stage::DELIVERY,
        }
    }

    fn accepts(&self, payload: &IntegrationPayload) -> bool {
        matches!(
            (self, payload),
            (Step::Validate, IntegrationPayload::OrderReceived(_))
                | (Step::Enrich, IntegrationPayload::OrderValidated(_))
                | (Step::Confirm, IntegrationPayload::OrderEnriched(_))
                | (Step::Deliver, IntegrationPayload::OrderDelivered(_))
        )
    }
}

/// Runs one pipeline step for every event on its topic.
pub struct StageHandler<S: EventStore> {
    pipeline: Arc<OrderPipeline<S>>,
    step: Step,
}

impl<S: EventStore> StageHandler<S> {
    pub fn new(pipeline: Arc<OrderPipeline<S>>, step: Step) -> Self {
        Self { pipeline, step }
    }

    async fn run(&self, event: &IntegrationEvent) -> Result<StageOutcome, PipelineError> {
        if !self.step.accepts(event.payload()) {
            return Err(PipelineError::UnexpectedEvent {
                stage: self.step.name(),
                event_type: event.event_type(),
            });
        }

        let correlation_id = event.correlation_id();
        match self.step {
            Step::Validate => self.pipeline.validate(&order_id_of(event)?, correlation_id).await,
            Step::Enrich => self.pipeline.enrich(&order_id_of(event)?, correlation_id).await,
            Step::Confirm => self.pipeline.confirm(&order_id_of(event)?, correlation_id).await,
            Step::Deliver => {
                let delivered = from_integration_event(event)?;
                self.pipeline.record_delivery(delivered, correlation_id).await
            }
        }
    }
}

fn order_id_of(event: &IntegrationEvent) -> Result<OrderId, PipelineError> {
    Ok(OrderId::parse(event.order_id()).map_err(CodecError::from)?)
}

#[async_trait]
impl<S: EventStore + 'static> EventHandler for StageHandler<S> {
    fn name(&self) -> &str {
        self.step.name()
    }

    async fn handle(&self, event: &IntegrationEvent) -> Result<(), HandlerError> {
        match self.run(event).await {
            Ok(outcome) => {
                tracing::debug!(
                    stage = self.step.name(),
                    order_id = %event.order_id(),
                    outcome = ?outcome,
                    "stage finished"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    stage = self.step.name(),
                    order_id = %event.order_id(),
                    correlation_id = %event.correlation_id(),
                    class = e.classify().as_str(),
                    error = %e,
                    "stage failed"
                );
                Err(e.into())
            }
        }
    }
}

/// Forwards high-value error events to a [`Notifier`].
///
/// Notification is best effort: once retries are used up the failure is
/// logged and counted, and the event is still acknowledged.
pub struct EscalationStage {
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
}

impl EscalationStage {
    pub fn new(notifier: Arc<dyn Notifier>, retry: RetryPolicy) -> Self {
        Self { notifier, retry }
    }
}

#[async_trait]
impl EventHandler for EscalationStage {
    fn name(&self) -> &str {
        stage::ESCALATION
    }

    async fn handle(&self, event: &IntegrationEvent) -> Result<(), HandlerError> {
        let IntegrationPayload::HighValueError(escalation) = event.payload() else {
            return Err(PipelineError::UnexpectedEvent {
                stage: stage::ESCALATION,
                event_type: event.event_type(),
            }
            .into());
        };

        match retry_on_transient(&self.retry, |_| self.notifier.notify(escalation)).await {
            RetryResult::Success { attempts, .. } => {
                tracing::info!(order_id = %escalation.order_id, attempts, "escalation notified");
            }
            RetryResult::Exhausted { error, attempts }
            | RetryResult::Permanent { error, attempts } => {
                tracing::error!(
                    order_id = %escalation.order_id,
                    attempts,
                    error = %error,
                    "escalation notification failed"
                );
                metrics::notification_failed();
            }
        }
        Ok(())
    }
}

/// Subscribes every pipeline step and the escalation notifier to `bus`.
pub async fn subscribe_stages<S, B>(
    bus: &B,
    pipeline: Arc<OrderPipeline<S>>,
    notifier: Arc<dyn Notifier>,
) -> messaging::Result<()>
where
    S: EventStore + 'static,
    B: MessageBus + ?Sized,
{
    for step in [Step::Validate, Step::Enrich, Step::Confirm, Step::Deliver] {
        let handler = Arc::new(StageHandler::new(Arc::clone(&pipeline), step));
        bus.subscribe(step.topic(), handler).await?;
    }

    let retry = pipeline.config().retry.clone();
    bus.subscribe(
        topics::HIGH_VALUE_ERRORS,
        Arc::new(EscalationStage::new(notifier, retry)),
    )
    .await?;

    tracing::info!("pipeline stages subscribed");
    Ok(())
}
