//! Status change notification.
//!
//! Listeners are called after a status change has been persisted. Delivery
//! (webhooks, chat, websockets) is up to the listener; the built-in one only logs.

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::{Execution, ExecutionStatus};

#[async_trait]
pub trait StatusListener: Send + Sync {
    /// `previous` is `None` when the prior status is not known to the caller.
    async fn status_changed(&self, execution: &Execution, previous: Option<ExecutionStatus>);
}

/// Logs every transition.
#[derive(Debug, Clone, Default)]
pub struct TracingStatusListener;

#[async_trait]
impl StatusListener for TracingStatusListener {
    async fn status_changed(&self, execution: &Execution, previous: Option<ExecutionStatus>) {
        tracing::info!(
            execution_id = %execution.id,
            runner_id = %execution.runner().unwrap_or("-"),
            previous = %previous.map(|s| s.as_str()).unwrap_or("-"),
            status = %execution.status(),
            predicted = %execution.result.predicted_status.map(|s| s.as_str()).unwrap_or("-"),
            "Execution status changed"
        );
    }
}

/// Fan-out to every registered listener, in registration order.
#[derive(Clone, Default)]
pub struct StatusListeners {
    listeners: Vec<Arc<dyn StatusListener>>,
}

impl StatusListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, listener: Arc<dyn StatusListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub async fn notify(&self, execution: &Execution, previous: Option<ExecutionStatus>) {
        for listener in &self.listeners {
            listener.status_changed(execution, previous).await;
        }
    }
}
