//! Order workflow worker.
//!
//! Loads [`Config`] from the environment, wires the pipeline stages to an
//! in-process bus and drains it until shutdown. The binary in `main.rs`
//! adds tracing, the Prometheus exporter and signal handling.

pub mod config;
pub mod error;
pub mod service;

pub use config::{Config, LogFormat};
pub use error::{Result, WorkerError};
pub use service::{FILE_SOURCE_SYSTEM, Worker, seed_catalog};
