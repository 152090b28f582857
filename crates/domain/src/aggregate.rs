//! Core aggregate and domain event traits.

use common::OrderId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events are immutable facts, named in past tense, and always carry
/// the id of the order they belong to.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone + PartialEq {
    /// Returns the event type name used for storage and filtering.
    fn event_type(&self) -> &'static str;

    fn order_id(&self) -> &OrderId;
}

/// What happened when an event was handed to [`Aggregate::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event advanced the aggregate and was appended to its log.
    Applied,
    /// The event equals the head of the log; nothing changed.
    Replayed,
}

/// Trait for event-sourced aggregates.
///
/// State is the fold of the event log. Unlike a plain projection, `apply`
/// is fallible: an event the current state cannot accept is rejected and
/// leaves the aggregate untouched.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;
    type Error: std::error::Error + Send + Sync;

    fn aggregate_type() -> &'static str;

    /// Returns None for an aggregate with an empty log.
    fn id(&self) -> Option<&OrderId>;

    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    fn apply(&mut self, event: Self::Event) -> Result<ApplyOutcome, Self::Error>;

    /// Applies events in order, stopping at the first rejection.
    fn apply_events(
        &mut self,
        events: impl IntoIterator<Item = Self::Event>,
    ) -> Result<(), Self::Error> {
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }
}
