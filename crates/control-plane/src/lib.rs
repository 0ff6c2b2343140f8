//! Testflow Control Plane Library
//!
//! Control plane for distributed test execution:
//!
//! - **Scheduling**: hand queued executions to polling runners, one at a time
//! - **Lifecycle control**: guarded start, pause, resume, abort and cancel
//! - **Querying**: lazy streams of executions awaiting a runner-side action
//! - **Result engine**: derive step, group and execution statuses plus the
//!   timeline from runner reports
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`db`]: The execution store abstraction and its backends
//! - [`engine`]: Result derivation over the signature tree
//! - [`error`]: Custom error types with Axum integration
//! - [`handlers`]: HTTP route handlers
//! - [`model`]: Execution documents and statuses
//! - [`scheduling`]: Scheduler, controller and querier
//! - [`services`]: Submission, report ingestion and status listeners
//! - [`state`]: Shared application state
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use testflow_control_plane::{
//!     db::MemoryExecutionStore,
//!     model::Runner,
//!     scheduling::SchedulingServices,
//! };
//!
//! let scheduling = SchedulingServices::new(Arc::new(MemoryExecutionStore::new()));
//! if let Some(execution) = scheduling.scheduler.schedule(&Runner::new("runner-1")).await? {
//!     scheduling.controller.start(&execution.id).await?;
//! }
//! ```

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod model;
pub mod result_ext;
pub mod scheduling;
pub mod services;
pub mod state;

pub use error::{AppError, AppResult};
pub use result_ext::ResultExt;
