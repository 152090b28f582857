//! Order processing workflow.
//!
//! Orders move through independent stages connected by the message bus:
//!
//! ```text
//! order-received ─► validation ─► order-validated ─► enrichment ─► order-enriched ─► confirmation
//!                                                                                        │
//! delivery-confirmed ─► delivery                       high-value-errors ─► escalation ◄─┘ (on failure)
//! ```
//!
//! Each stage is an [`EventHandler`](messaging::EventHandler) over an
//! [`OrderPipeline`]; the pipeline owns the write path and the
//! collaborators (enrichment sources, supplier gateway). Failures that
//! meet the escalation policy publish a high-value error event, which the
//! escalation stage hands to a [`Notifier`].

pub mod enrichment;
pub mod error;
pub mod escalation;
pub mod metrics;
pub mod notifier;
pub mod pipeline;
pub mod retry;
pub mod stages;
pub mod supplier;

pub use enrichment::{
    CustomerProfileSource, DeliveryDataSource, DocumentStore, EnrichmentCoordinator,
    EnrichmentOutcome, EnrichmentPolicy, EnrichmentRequest, EnrichmentSource,
    InMemoryDocumentStore, ProductCatalogSource, SourceError,
};
pub use error::{FailureClass, PipelineError, Result};
pub use escalation::{CustomerContext, EscalationMode, EscalationPolicy, ProcessingFailure};
pub use notifier::{InMemoryNotifier, LogNotifier, Notifier, NotifyError};
pub use pipeline::{OrderPipeline, PipelineConfig, StageOutcome};
pub use retry::{IsTransient, RetryPolicy, RetryResult, retry_on_transient};
pub use stages::{EscalationStage, StageHandler, Step, subscribe_stages};
pub use supplier::{InMemorySupplierGateway, SupplierDecision, SupplierError, SupplierGateway};
