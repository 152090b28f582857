use domain::ValueError;
use thiserror::Error;

/// Errors raised while encoding or decoding integration events.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The `eventType` tag is not one this service understands.
    #[error("Unrecognized event type: {0}")]
    UnrecognizedEventType(String),

    /// The message is not valid JSON or a field has the wrong shape.
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload is a wire-only event with no domain counterpart.
    #[error("{0} has no domain event counterpart")]
    NotADomainEvent(&'static str),

    /// The fields contradict the event type.
    #[error("Inconsistent payload: {0}")]
    InconsistentPayload(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] common::IdError),

    #[error("Invalid value: {0}")]
    InvalidValue(#[from] ValueError),
}

impl CodecError {
    /// Short label used for dead-letter accounting.
    pub fn kind(&self) -> &'static str {
        match self {
            CodecError::UnrecognizedEventType(_) => "unrecognized_event_type",
            CodecError::Malformed(_) => "malformed",
            CodecError::NotADomainEvent(_) => "not_a_domain_event",
            CodecError::InconsistentPayload(_) => "inconsistent_payload",
            CodecError::InvalidId(_) | CodecError::InvalidValue(_) => "invalid_value",
        }
    }
}

/// Errors raised by a message bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid topic name: {0:?}")]
    InvalidTopic(String),

    /// The transport could not take the message right now.
    #[error("Bus unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a handler that did not process a message.
///
/// The variant tells the bus what to do with the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Infrastructure hiccup; the message is redelivered.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The message can never be processed; it is dead-lettered.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// A protocol invariant was violated. Reported to the operator and
    /// dead-lettered.
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl From<CodecError> for HandlerError {
    fn from(e: CodecError) -> Self {
        HandlerError::Rejected(e.to_string())
    }
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
