//! Execution management service.
//!
//! Submission and lookup, plus the scheduling components wired to the status
//! listeners.

use chrono::Utc;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use super::listener::StatusListeners;
use crate::error::{AppError, AppResult};
use crate::model::{Execution, NewExecution, Runner};
use crate::scheduling::{PendingKind, SchedulingServices};

/// Lifecycle commands accepted from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlCommand {
    Start,
    Pause,
    Resume,
    Abort,
    Cancel,
    ForceCancel,
}

impl ControlCommand {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "abort" => Some(Self::Abort),
            "cancel" => Some(Self::Cancel),
            "force-cancel" => Some(Self::ForceCancel),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ExecutionService {
    scheduling: SchedulingServices,
    listeners: StatusListeners,
}

impl ExecutionService {
    pub fn new(scheduling: SchedulingServices, listeners: StatusListeners) -> Self {
        Self {
            scheduling,
            listeners,
        }
    }

    pub fn scheduling(&self) -> &SchedulingServices {
        &self.scheduling
    }

    /// Enqueue a new execution in `queued` state.
    pub async fn submit(&self, request: NewExecution) -> AppResult<Execution> {
        let id = match request.id {
            Some(id) if id.trim().is_empty() => {
                return Err(AppError::Validation("execution id must not be blank".to_string()))
            }
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };
        let scheduled_at = request.scheduled_at.unwrap_or_else(Utc::now);

        let mut execution = Execution::queued(id, scheduled_at).with_signature(request.signature);
        execution.name = request.name;

        self.scheduling
            .store
            .insert(&execution)
            .await
            .map_err(|e| AppError::store("submit", execution.id.as_str(), e))?;

        tracing::info!(
            execution_id = %execution.id,
            scheduled_at = %execution.scheduled_at,
            "Execution queued"
        );
        self.listeners.notify(&execution, None).await;
        Ok(execution)
    }

    pub async fn get(&self, execution_id: &str) -> AppResult<Execution> {
        self.scheduling
            .store
            .get(execution_id)
            .await
            .map_err(|e| AppError::store("get", execution_id, e))?
            .ok_or_else(|| AppError::NotFound(format!("execution '{}'", execution_id)))
    }

    pub async fn schedule(&self, runner: &Runner) -> AppResult<Option<Execution>> {
        let claimed = self.scheduling.scheduler.schedule(runner).await?;
        if let Some(execution) = &claimed {
            self.listeners.notify(execution, None).await;
        }
        Ok(claimed)
    }

    /// Run a lifecycle command. `Ok(None)` when the guard did not match.
    pub async fn command(&self, execution_id: &str, command: ControlCommand) -> AppResult<Option<Execution>> {
        let controller = &self.scheduling.controller;
        let updated = match command {
            ControlCommand::Start => controller.start(execution_id).await?,
            ControlCommand::Pause => controller.pause(execution_id).await?,
            ControlCommand::Resume => controller.resume(execution_id).await?,
            ControlCommand::Abort => controller.abort(execution_id).await?,
            ControlCommand::Cancel => controller.cancel(execution_id).await?,
            ControlCommand::ForceCancel => controller.force_cancel(execution_id).await?,
        };
        if let Some(execution) = &updated {
            self.listeners.notify(execution, None).await;
        }
        Ok(updated)
    }

    /// Snapshot of the executions currently awaiting `kind`.
    pub async fn pending(&self, kind: PendingKind) -> AppResult<Vec<Execution>> {
        self.scheduling.querier.pending(kind).try_collect().await
    }
}
