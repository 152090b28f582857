//! Worker error types.

use std::path::PathBuf;

use event_store::EventStoreError;
use messaging::BusError;
use thiserror::Error;
use workflow::PipelineError;

/// Errors that stop the worker from starting or ingesting orders.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// An environment variable is present but unusable.
    #[error("Invalid value for {key}: {message}")]
    Config { key: &'static str, message: String },

    #[error("Failed to read orders file {path}: {source}")]
    OrdersFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid orders file: {0}")]
    OrdersFormat(#[from] serde_json::Error),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Metrics exporter error: {0}")]
    Metrics(String),
}

impl WorkerError {
    pub(crate) fn config(key: &'static str, message: impl Into<String>) -> Self {
        WorkerError::Config {
            key,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
