//! HTTP handlers, grouped by caller: producers and operators (`executions`),
//! polling runners (`runners`, `reports`) and health checks (`health`).

pub mod executions;
pub mod health;
pub mod reports;
pub mod runners;

pub use health::{api_health, health_check};
