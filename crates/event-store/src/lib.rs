pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::OrderId;
pub use error::{EventStoreError, Result};
pub use event::{CORRELATION_ID_KEY, EventEnvelope, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
