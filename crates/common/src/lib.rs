pub mod types;

pub use types::{CorrelationId, IdError, OrderId};
