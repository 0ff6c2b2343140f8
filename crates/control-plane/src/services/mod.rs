//! Service layer between the HTTP handlers and the scheduling core.

pub mod execution;
pub mod ingest;
pub mod listener;

pub use execution::{ControlCommand, ExecutionService};
pub use ingest::ResultIngestor;
pub use listener::{StatusListener, StatusListeners, TracingStatusListener};
