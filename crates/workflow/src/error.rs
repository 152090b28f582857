//! Pipeline error types and their mapping onto bus outcomes.

use common::OrderId;
use domain::DomainError;
use event_store::EventStoreError;
use messaging::{BusError, CodecError, HandlerError};
use thiserror::Error;

use crate::enrichment::SourceError;
use crate::notifier::NotifyError;
use crate::retry::IsTransient;
use crate::supplier::SupplierError;

/// How a failure is treated by the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The input breaks a business rule. Never retried.
    ValidationFailure,
    /// Store, transport or collaborator trouble. Retried within bounds.
    TransientInfrastructureFailure,
    /// An event arrived for a state that cannot accept it.
    InvalidTransition,
    /// The message could not be decoded.
    UnrecognizedEventType,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::ValidationFailure => "validation_failure",
            FailureClass::TransientInfrastructureFailure => "transient_infrastructure_failure",
            FailureClass::InvalidTransition => "invalid_transition",
            FailureClass::UnrecognizedEventType => "unrecognized_event_type",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// The order has events but no stored submission.
    #[error("No order record for {0}")]
    RecordNotFound(OrderId),

    #[error("Enrichment source error: {0}")]
    Source(#[from] SourceError),

    #[error("Supplier error: {0}")]
    Supplier(#[from] SupplierError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// The message was well-formed but not what the stage consumes.
    #[error("Unexpected {event_type} on stage {stage}")]
    UnexpectedEvent {
        stage: &'static str,
        event_type: &'static str,
    },
}

impl PipelineError {
    pub fn classify(&self) -> FailureClass {
        match self {
            PipelineError::Domain(e) if e.is_invalid_transition() => {
                FailureClass::InvalidTransition
            }
            PipelineError::Domain(DomainError::OrderNotFound(_)) => FailureClass::InvalidTransition,
            PipelineError::Domain(e) if e.is_transient() => {
                FailureClass::TransientInfrastructureFailure
            }
            PipelineError::Domain(_) => FailureClass::ValidationFailure,
            PipelineError::Codec(
                CodecError::UnrecognizedEventType(_) | CodecError::Malformed(_),
            ) => FailureClass::UnrecognizedEventType,
            PipelineError::Codec(_) => FailureClass::ValidationFailure,
            PipelineError::UnexpectedEvent { .. } => FailureClass::UnrecognizedEventType,
            PipelineError::RecordNotFound(_) => FailureClass::InvalidTransition,
            PipelineError::Bus(_)
            | PipelineError::Source(_)
            | PipelineError::Supplier(_)
            | PipelineError::Notify(_) => FailureClass::TransientInfrastructureFailure,
        }
    }

    /// True when another writer advanced the order first. Re-running the
    /// stage resolves it, so it is not an outage.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            PipelineError::Domain(DomainError::EventStore(
                EventStoreError::ConcurrencyConflict { .. }
            ))
        )
    }
}

impl IsTransient for PipelineError {
    fn is_transient(&self) -> bool {
        self.classify() == FailureClass::TransientInfrastructureFailure
    }
}

impl From<PipelineError> for HandlerError {
    fn from(e: PipelineError) -> Self {
        match e.classify() {
            FailureClass::TransientInfrastructureFailure => HandlerError::Transient(e.to_string()),
            FailureClass::InvalidTransition => HandlerError::Fatal(e.to_string()),
            FailureClass::ValidationFailure | FailureClass::UnrecognizedEventType => {
                HandlerError::Rejected(e.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
