//! Domain layer for the order workflow.
//!
//! - `Order` aggregate: owns an order's event log and enforces the
//!   lifecycle transition table
//! - validation engine: pure, collect-all rule checks over raw payloads
//! - `OrderService`: the write path that appends transitions with an
//!   optimistic version check
//! - order record store for the payload as received

pub mod aggregate;
pub mod command;
pub mod error;
pub mod order;
pub mod validation;

pub use aggregate::{Aggregate, ApplyOutcome, DomainEvent};
pub use command::{CommandHandler, CommandResult};
pub use error::DomainError;
pub use order::{
    Currency, CustomerId, InMemoryOrderRecordStore, Money, Order, OrderError, OrderEvent,
    OrderItem, OrderRecord, OrderRecordStore, OrderService, OrderState, ProductId, RecordOutcome,
    ValueError,
};
pub use validation::{
    OrderItemPayload, OrderPayload, ValidatedOrder, ValidationResult, validate_order,
    validate_order_on,
};
