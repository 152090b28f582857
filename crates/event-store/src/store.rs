use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{EventEnvelope, EventStoreError, OrderId, Result, Version};

/// Options for appending events to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected version of the order's log. `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Expects the order to have no events yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Append-only store of per-order event logs.
///
/// The append is the single mutation point for an order: callers pass the
/// version they loaded and a concurrent writer surfaces as
/// `ConcurrencyConflict` instead of an interleaved log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events atomically and returns the order's new version.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// All events for one order, oldest first.
    async fn get_events_for_order(&self, order_id: &OrderId) -> Result<Vec<EventEnvelope>>;

    async fn get_events_for_order_from_version(
        &self,
        order_id: &OrderId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>>;

    /// Streams every stored event in insertion order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Current version of an order, or None if it has no events.
    async fn get_order_version(&self, order_id: &OrderId) -> Result<Option<Version>>;
}

#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn append_event(&self, event: EventEnvelope, options: AppendOptions) -> Result<Version> {
        self.append(vec![event], options).await
    }

    async fn order_exists(&self, order_id: &OrderId) -> Result<bool> {
        Ok(self.get_order_version(order_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a batch is non-empty, targets one order and has sequential versions.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append empty event list".to_string(),
        ));
    };

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        if event.order_id != first.order_id {
            return Err(EventStoreError::InvalidAppend(
                "all events must be for the same order".to_string(),
            ));
        }
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {}, got {}",
                expected_version, event.version
            )));
        }
    }

    Ok(())
}
