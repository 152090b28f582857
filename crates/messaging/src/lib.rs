//! Cross-service messaging for the order workflow.
//!
//! Domain events never leave the process as-is. They are encoded into
//! [`IntegrationEvent`]s, a JSON envelope carrying a correlation id and only
//! primitive fields, and published on a topic per event type. Consumers
//! subscribe an [`EventHandler`] per topic; delivery is at-least-once.

pub mod bus;
pub mod codec;
pub mod error;
pub mod event;
pub mod memory;
pub mod trail;

pub use bus::{BusObserver, EventHandler, MessageBus, MessageBusExt};
pub use codec::{from_integration_event, to_integration_event};
pub use error::{BusError, CodecError, HandlerError, Result};
pub use event::{
    HighValueErrorData, IntegrationEvent, IntegrationPayload, OrderCancelledData,
    OrderConfirmedData, OrderCreatedData, OrderDeliveredData, OrderEnrichedData,
    OrderFailedData, OrderReceivedData, OrderValidatedData, OrderValidationStartedData, topics,
};
pub use memory::{
    DEFAULT_DEAD_LETTER_CAPACITY, DEFAULT_MAX_DELIVERIES, DEFAULT_PUBLISHED_CAPACITY, DeadLetter,
    DeadLetterReason, DispatchReport, FatalDelivery, InMemoryMessageBus,
};
pub use trail::CorrelationTrail;
