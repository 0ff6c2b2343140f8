//! Execution scheduling.
//!
//! - [`Scheduler`]: hands queued executions to polling runners
//! - [`Controller`]: guarded lifecycle commands
//! - [`Querier`]: streams of executions awaiting a runner-side action
//!
//! All three share one [`ExecutionStore`], chosen once at startup.

pub mod controller;
pub mod querier;
pub mod scheduler;

use std::sync::Arc;

pub use controller::Controller;
pub use querier::{ExecutionStream, PendingKind, Querier};
pub use scheduler::Scheduler;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::db::{create_pool, ExecutionStore, MemoryExecutionStore, PostgresExecutionStore};
use crate::error::{AppError, AppResult};

/// Open the configured store backend.
pub async fn open_store(
    backend: StoreBackend,
    database: &DatabaseConfig,
) -> AppResult<Arc<dyn ExecutionStore>> {
    let store: Arc<dyn ExecutionStore> = match backend {
        StoreBackend::Memory => Arc::new(MemoryExecutionStore::new()),
        StoreBackend::Postgres => {
            let pool = create_pool(database)
                .await
                .map_err(|e| AppError::Config(format!("cannot connect to execution store: {}", e)))?;
            let store = PostgresExecutionStore::new(pool);
            store
                .ensure_schema()
                .await
                .map_err(|e| AppError::query("ensure_schema", e))?;
            Arc::new(store)
        }
    };
    tracing::info!(backend = %backend, "Execution store opened");
    Ok(store)
}

/// The scheduling capability set over one shared store.
#[derive(Clone)]
pub struct SchedulingServices {
    pub store: Arc<dyn ExecutionStore>,
    pub scheduler: Scheduler,
    pub controller: Controller,
    pub querier: Querier,
}

impl SchedulingServices {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            scheduler: Scheduler::new(store.clone()),
            controller: Controller::new(store.clone()),
            querier: Querier::new(store.clone()),
            store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_opens_without_database() {
        let store = open_store(StoreBackend::Memory, &DatabaseConfig::default())
            .await
            .unwrap();
        assert!(store.get("anything").await.unwrap().is_none());
    }
}
