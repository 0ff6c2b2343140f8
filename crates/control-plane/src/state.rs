//! Shared application state handed to the health and admin handlers.

use crate::config::AppConfig;
use crate::services::{ExecutionService, ResultIngestor};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    pub executions: ExecutionService,

    pub ingestor: ResultIngestor,

    /// Server start time for uptime calculation
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: AppConfig, executions: ExecutionService, ingestor: ResultIngestor) -> Self {
        Self {
            config: Arc::new(config),
            executions,
            ingestor,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// `true` when the execution store answers.
    pub async fn store_reachable(&self) -> bool {
        self.executions.scheduling().store.ping().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::MemoryExecutionStore;
    use crate::scheduling::SchedulingServices;
    use crate::services::StatusListeners;

    /// State over a fresh in-memory store.
    pub fn memory_state() -> AppState {
        let scheduling = SchedulingServices::new(Arc::new(MemoryExecutionStore::new()));
        let ingestor = ResultIngestor::new(scheduling.store.clone(), StatusListeners::new(), 5);
        let config = AppConfig {
            store_backend: crate::config::StoreBackend::Memory,
            ..AppConfig::default()
        };
        AppState::new(
            config,
            ExecutionService::new(scheduling, StatusListeners::new()),
            ingestor,
        )
    }

    #[tokio::test]
    async fn test_memory_store_is_reachable() {
        let state = memory_state();
        assert!(state.store_reachable().await);
        assert!(state.uptime_seconds() < 5);
    }
}
