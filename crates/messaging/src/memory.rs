//! In-process message bus for tests and single-node deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::bus::{BusObserver, EventHandler, MessageBus};
use crate::error::{BusError, HandlerError, Result};
use crate::event::IntegrationEvent;

/// Default number of attempts before a transiently failing delivery is
/// dead-lettered.
pub const DEFAULT_MAX_DELIVERIES: u32 = 5;

/// Default number of published bodies kept for [`InMemoryMessageBus::published`].
pub const DEFAULT_PUBLISHED_CAPACITY: usize = 1_000;

/// Default number of dead letters kept until drained.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1_000;

/// Why a message ended up in the dead-letter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// The body could not be decoded; carries the codec error kind.
    Undecodable(&'static str),
    /// The handler rejected the message as unprocessable.
    Rejected,
    /// The handler kept failing transiently.
    RetriesExhausted,
    /// The handler hit a protocol violation.
    Fatal,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::Undecodable(kind) => *kind,
            DeadLetterReason::Rejected => "rejected",
            DeadLetterReason::RetriesExhausted => "retries_exhausted",
            DeadLetterReason::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub topic: String,
    pub handler: String,
    pub body: String,
    pub reason: DeadLetterReason,
    pub error: String,
    pub attempts: u32,
}

/// A delivery that failed with [`HandlerError::Fatal`].
#[derive(Debug, Clone)]
pub struct FatalDelivery {
    pub topic: String,
    pub handler: String,
    pub event_type: &'static str,
    pub order_id: String,
    pub error: String,
}

/// Summary of one [`InMemoryMessageBus::dispatch_until_idle`] run.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub redelivered: usize,
    pub dead_lettered: usize,
    pub fatal: Vec<FatalDelivery>,
}

impl DispatchReport {
    /// True when every delivery succeeded on some attempt.
    pub fn is_clean(&self) -> bool {
        self.dead_lettered == 0 && self.fatal.is_empty()
    }

    pub fn merge(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.redelivered += other.redelivered;
        self.dead_lettered += other.dead_lettered;
        self.fatal.extend(other.fatal);
    }
}

struct Delivery {
    topic: String,
    handler: Arc<dyn EventHandler>,
    body: Arc<str>,
    attempt: u32,
}

#[derive(Default)]
struct BusState {
    subscriptions: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    observers: Vec<Arc<dyn BusObserver>>,
    queue: VecDeque<Delivery>,
    published: VecDeque<(String, Arc<str>)>,
    dead_letters: VecDeque<DeadLetter>,
    duplicate_delivery: bool,
}

impl BusState {
    fn record_published(&mut self, capacity: usize, topic: &str, body: Arc<str>) {
        if capacity == 0 {
            return;
        }
        if self.published.len() >= capacity {
            self.published.pop_front();
        }
        self.published.push_back((topic.to_string(), body));
    }
}

/// Message bus that carries serialized JSON between in-process handlers.
///
/// Publishing only enqueues; handlers run when the owner calls
/// [`dispatch_until_idle`](Self::dispatch_until_idle). Each subscribed
/// handler gets its own copy of a message, delivered in FIFO order.
///
/// The published log and the dead-letter list are bounded; the oldest
/// entries go first. Long-running owners should take dead letters with
/// [`drain_dead_letters`](Self::drain_dead_letters).
#[derive(Clone)]
pub struct InMemoryMessageBus {
    state: Arc<Mutex<BusState>>,
    max_deliveries: u32,
    published_capacity: usize,
    dead_letter_capacity: usize,
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            published_capacity: DEFAULT_PUBLISHED_CAPACITY,
            dead_letter_capacity: DEFAULT_DEAD_LETTER_CAPACITY,
        }
    }

    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    /// How many published bodies to keep for inspection. Zero keeps none.
    pub fn with_published_capacity(mut self, capacity: usize) -> Self {
        self.published_capacity = capacity;
        self
    }

    pub fn with_dead_letter_capacity(mut self, capacity: usize) -> Self {
        self.dead_letter_capacity = capacity.max(1);
        self
    }

    /// When enabled every message is delivered twice, to exercise handler
    /// idempotency.
    pub async fn set_duplicate_delivery(&self, enabled: bool) {
        self.state.lock().await.duplicate_delivery = enabled;
    }

    pub async fn add_observer(&self, observer: Arc<dyn BusObserver>) {
        self.state.lock().await.observers.push(observer);
    }

    /// Enqueues a raw body without encoding it, as a foreign producer would.
    pub async fn publish_raw(&self, topic: &str, body: impl Into<String>) {
        let body: Arc<str> = Arc::from(body.into());
        let mut state = self.state.lock().await;
        state.record_published(self.published_capacity, topic, body.clone());
        Self::enqueue(&mut state, topic, body);
    }

    /// Number of deliveries waiting.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Dead letters still held, oldest first.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.iter().cloned().collect()
    }

    /// Takes every held dead letter, leaving the list empty.
    pub async fn drain_dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.drain(..).collect()
    }

    /// Decodable events published on `topic`, oldest first.
    pub async fn published(&self, topic: &str) -> Vec<IntegrationEvent> {
        self.state
            .lock()
            .await
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .filter_map(|(_, body)| IntegrationEvent::from_json(body).ok())
            .collect()
    }

    /// Delivers queued messages, including those published by handlers along
    /// the way, until the queue is empty.
    pub async fn dispatch_until_idle(&self) -> DispatchReport {
        let mut report = DispatchReport::default();
        while let Some(delivery) = self.next_delivery().await {
            self.deliver(delivery, &mut report).await;
        }
        report
    }

    fn enqueue(state: &mut BusState, topic: &str, body: Arc<str>) {
        let copies = if state.duplicate_delivery { 2 } else { 1 };
        let Some(handlers) = state.subscriptions.get(topic) else {
            tracing::debug!(topic, "no subscribers");
            return;
        };
        let deliveries: Vec<Delivery> = handlers
            .iter()
            .flat_map(|handler| {
                (0..copies).map(|_| Delivery {
                    topic: topic.to_string(),
                    handler: handler.clone(),
                    body: body.clone(),
                    attempt: 1,
                })
            })
            .collect();
        state.queue.extend(deliveries);
    }

    async fn next_delivery(&self) -> Option<Delivery> {
        self.state.lock().await.queue.pop_front()
    }

    async fn deliver(&self, delivery: Delivery, report: &mut DispatchReport) {
        let event = match IntegrationEvent::from_json(&delivery.body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    topic = %delivery.topic,
                    handler = delivery.handler.name(),
                    error = %e,
                    "dropping undecodable message"
                );
                let reason = DeadLetterReason::Undecodable(e.kind());
                self.dead_letter(&delivery, reason, e.to_string()).await;
                report.dead_lettered += 1;
                return;
            }
        };

        let outcome = delivery.handler.handle(&event).await;
        match outcome {
            Ok(()) => report.delivered += 1,
            Err(HandlerError::Transient(msg)) if delivery.attempt < self.max_deliveries => {
                tracing::warn!(
                    topic = %delivery.topic,
                    handler = delivery.handler.name(),
                    attempt = delivery.attempt,
                    error = %msg,
                    "transient handler failure, redelivering"
                );
                report.redelivered += 1;
                self.state.lock().await.queue.push_back(Delivery {
                    attempt: delivery.attempt + 1,
                    ..delivery
                });
            }
            Err(HandlerError::Transient(msg)) => {
                tracing::error!(
                    topic = %delivery.topic,
                    handler = delivery.handler.name(),
                    error = %msg,
                    "delivery attempts exhausted"
                );
                self.dead_letter(&delivery, DeadLetterReason::RetriesExhausted, msg)
                    .await;
                report.dead_lettered += 1;
            }
            Err(HandlerError::Rejected(msg)) => {
                tracing::warn!(
                    topic = %delivery.topic,
                    handler = delivery.handler.name(),
                    error = %msg,
                    "message rejected"
                );
                self.dead_letter(&delivery, DeadLetterReason::Rejected, msg)
                    .await;
                report.dead_lettered += 1;
            }
            Err(HandlerError::Fatal(msg)) => {
                tracing::error!(
                    topic = %delivery.topic,
                    handler = delivery.handler.name(),
                    order_id = event.order_id(),
                    event_type = event.event_type(),
                    error = %msg,
                    "protocol violation while handling message"
                );
                report.fatal.push(FatalDelivery {
                    topic: delivery.topic.clone(),
                    handler: delivery.handler.name().to_string(),
                    event_type: event.event_type(),
                    order_id: event.order_id().to_string(),
                    error: msg.clone(),
                });
                self.dead_letter(&delivery, DeadLetterReason::Fatal, msg).await;
                report.dead_lettered += 1;
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: DeadLetterReason, error: String) {
        metrics::counter!("bus_dead_letters_total", "reason" => reason.as_str()).increment(1);
        let mut state = self.state.lock().await;
        if state.dead_letters.len() >= self.dead_letter_capacity {
            if let Some(dropped) = state.dead_letters.pop_front() {
                tracing::warn!(
                    topic = %dropped.topic,
                    handler = %dropped.handler,
                    reason = dropped.reason.as_str(),
                    "dead-letter list full, dropping oldest"
                );
            }
        }
        state.dead_letters.push_back(DeadLetter {
            topic: delivery.topic.clone(),
            handler: delivery.handler.name().to_string(),
            body: delivery.body.to_string(),
            reason,
            error,
            attempts: delivery.attempt,
        });
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, topic: &str, event: &IntegrationEvent) -> Result<()> {
        let body: Arc<str> = Arc::from(event.to_json()?);
        let mut state = self.state.lock().await;
        for observer in &state.observers {
            observer.on_publish(topic, event);
        }
        state.record_published(self.published_capacity, topic, body.clone());
        Self::enqueue(&mut state, topic, body);
        tracing::debug!(
            topic,
            event_type = event.event_type(),
            order_id = event.order_id(),
            correlation_id = %event.correlation_id(),
            "published"
        );
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) -> Result<()> {
        if topic.trim().is_empty() {
            return Err(BusError::InvalidTopic(topic.to_string()));
        }
        tracing::debug!(topic, handler = handler.name(), "subscribed");
        self.state
            .lock()
            .await
            .subscriptions
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;
    use common::CorrelationId;

    use super::*;
    use crate::event::{IntegrationPayload, OrderDeliveredData, topics};

    /// Fails transiently `failures` times, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EventHandler for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn handle(&self, _event: &IntegrationEvent) -> std::result::Result<(), HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(HandlerError::Transient("busy".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct Always(HandlerError);

    #[async_trait]
    impl EventHandler for Always {
        fn name(&self) -> &str {
            "always"
        }

        async fn handle(&self, _event: &IntegrationEvent) -> std::result::Result<(), HandlerError> {
            Err(self.0.clone())
        }
    }

    fn delivered_event() -> IntegrationEvent {
        IntegrationEvent::new(
            IntegrationPayload::OrderDelivered(OrderDeliveredData {
                order_id: "ORD-1".to_string(),
                delivered_at: Utc::now(),
            }),
            "courier",
            CorrelationId::new(),
        )
    }

    #[tokio::test]
    async fn test_transient_failures_are_redelivered() {
        let bus = InMemoryMessageBus::new();
        let handler = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        bus.subscribe(topics::ORDER_DELIVERED, handler.clone())
            .await
            .unwrap();

        bus.publish(topics::ORDER_DELIVERED, &delivered_event())
            .await
            .unwrap();
        let report = bus.dispatch_until_idle().await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.redelivered, 2);
        assert!(report.is_clean());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_dead_lettered() {
        let bus = InMemoryMessageBus::new().with_max_deliveries(2);
        bus.subscribe(
            topics::ORDER_DELIVERED,
            Arc::new(Always(HandlerError::Transient("down".to_string()))),
        )
        .await
        .unwrap();

        bus.publish_event_for_test().await;
        let report = bus.dispatch_until_idle().await;

        assert_eq!(report.redelivered, 1);
        assert_eq!(report.dead_lettered, 1);
        let dead = bus.dead_letters().await;
        assert_eq!(dead[0].reason, DeadLetterReason::RetriesExhausted);
        assert_eq!(dead[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_fatal_is_reported_and_dead_lettered() {
        let bus = InMemoryMessageBus::new();
        bus.subscribe(
            topics::ORDER_DELIVERED,
            Arc::new(Always(HandlerError::Fatal("bad transition".to_string()))),
        )
        .await
        .unwrap();

        bus.publish_event_for_test().await;
        let report = bus.dispatch_until_idle().await;

        assert_eq!(report.fatal.len(), 1);
        assert_eq!(report.fatal[0].event_type, "OrderDeliveredEvent");
        assert_eq!(report.fatal[0].order_id, "ORD-1");
        assert_eq!(bus.dead_letters().await[0].reason, DeadLetterReason::Fatal);
    }

    #[tokio::test]
    async fn test_rejected_is_dead_lettered_without_retry() {
        let bus = InMemoryMessageBus::new();
        bus.subscribe(
            topics::ORDER_DELIVERED,
            Arc::new(Always(HandlerError::Rejected("nope".to_string()))),
        )
        .await
        .unwrap();

        bus.publish_event_for_test().await;
        let report = bus.dispatch_until_idle().await;

        assert_eq!(report.redelivered, 0);
        assert_eq!(bus.dead_letters().await[0].reason, DeadLetterReason::Rejected);
    }

    #[tokio::test]
    async fn test_undecodable_messages_are_dead_lettered() {
        let bus = InMemoryMessageBus::new();
        let handler = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        bus.subscribe(topics::ORDER_DELIVERED, handler.clone())
            .await
            .unwrap();

        bus.publish_raw(topics::ORDER_DELIVERED, "{\"eventType\": 1").await;
        bus.publish_raw(
            topics::ORDER_DELIVERED,
            serde_json::json!({
                "id": uuid::Uuid::new_v4(),
                "createdAt": "2025-01-01T00:00:00Z",
                "eventType": "OrderLostEvent",
                "correlationId": "c",
                "data": {}
            })
            .to_string(),
        )
        .await;
        let report = bus.dispatch_until_idle().await;

        assert_eq!(report.dead_lettered, 2);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        let reasons: Vec<_> = bus
            .dead_letters()
            .await
            .iter()
            .map(|d| d.reason.as_str())
            .collect();
        assert_eq!(reasons, vec!["malformed", "unrecognized_event_type"]);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_sends_each_message_twice() {
        let bus = InMemoryMessageBus::new();
        let handler = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        bus.subscribe(topics::ORDER_DELIVERED, handler.clone())
            .await
            .unwrap();
        bus.set_duplicate_delivery(true).await;

        bus.publish_event_for_test().await;
        let report = bus.dispatch_until_idle().await;

        assert_eq!(report.delivered, 2);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_recorded() {
        let bus = InMemoryMessageBus::new();
        bus.publish_event_for_test().await;

        assert_eq!(bus.pending().await, 0);
        assert_eq!(bus.published(topics::ORDER_DELIVERED).await.len(), 1);
    }

    #[tokio::test]
    async fn test_published_log_keeps_only_the_newest() {
        let bus = InMemoryMessageBus::new().with_published_capacity(2);
        for _ in 0..5 {
            bus.publish_event_for_test().await;
        }
        assert_eq!(bus.published(topics::ORDER_DELIVERED).await.len(), 2);

        let silent = InMemoryMessageBus::new().with_published_capacity(0);
        silent.publish_event_for_test().await;
        assert!(silent.published(topics::ORDER_DELIVERED).await.is_empty());
    }

    #[tokio::test]
    async fn test_dead_letters_are_bounded_and_drained() {
        let bus = InMemoryMessageBus::new().with_dead_letter_capacity(2);
        bus.subscribe(
            topics::ORDER_DELIVERED,
            Arc::new(Always(HandlerError::Rejected("nope".to_string()))),
        )
        .await
        .unwrap();
        for _ in 0..3 {
            bus.publish_event_for_test().await;
        }

        let report = bus.dispatch_until_idle().await;

        assert_eq!(report.dead_lettered, 3);
        assert_eq!(bus.drain_dead_letters().await.len(), 2);
        assert!(bus.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn test_blank_topic_is_rejected() {
        let bus = InMemoryMessageBus::new();
        let result = bus
            .subscribe(" ", Arc::new(Always(HandlerError::Rejected(String::new()))))
            .await;
        assert!(matches!(result, Err(BusError::InvalidTopic(_))));
    }

    impl InMemoryMessageBus {
        async fn publish_event_for_test(&self) {
            self.publish(topics::ORDER_DELIVERED, &delivered_event())
                .await
                .unwrap();
        }
    }
}
