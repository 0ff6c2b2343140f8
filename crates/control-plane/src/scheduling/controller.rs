//! Guarded lifecycle commands.
//!
//! Every command is a single compare-and-set against the store. An execution
//! that is not in one of the expected prior statuses is left untouched and the
//! command returns `Ok(None)`; only storage failures are errors.

use std::sync::Arc;

use chrono::Utc;

use crate::db::{Assignment, ExecutionStore, Filter, ReturnDocument, Update};
use crate::error::{AppError, AppResult};
use crate::model::{Execution, ExecutionStatus};

/// Statuses in which a runner may be holding partial results, so stopping
/// goes through `stopping` and waits for the runner's final report.
const STOPPABLE: [ExecutionStatus; 5] = [
    ExecutionStatus::Starting,
    ExecutionStatus::Scheduling,
    ExecutionStatus::Running,
    ExecutionStatus::Paused,
    ExecutionStatus::Resuming,
];

/// Statuses that can be stopped immediately since nothing has started yet.
const NOT_STARTED: [ExecutionStatus; 2] = [ExecutionStatus::Queued, ExecutionStatus::Assigned];

#[derive(Clone)]
pub struct Controller {
    store: Arc<dyn ExecutionStore>,
}

impl Controller {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    async fn transition(
        &self,
        operation: &'static str,
        execution_id: &str,
        guard: Filter,
        update: Update,
    ) -> AppResult<Option<Execution>> {
        let updated = self
            .store
            .find_one_and_update(
                &Filter::id(execution_id).and(guard),
                &update,
                None,
                ReturnDocument::After,
            )
            .await
            .map_err(|e| AppError::store(operation, execution_id, e))?;

        match &updated {
            Some(execution) => tracing::info!(
                execution_id = %execution_id,
                operation,
                status = %execution.status(),
                "Execution transitioned"
            ),
            None => tracing::debug!(
                execution_id = %execution_id,
                operation,
                "Guard not satisfied, nothing to do"
            ),
        }
        Ok(updated)
    }

    /// Move one status to the next and stamp `status_at`.
    async fn simple(
        &self,
        operation: &'static str,
        execution_id: &str,
        from: ExecutionStatus,
        to: ExecutionStatus,
    ) -> AppResult<Option<Execution>> {
        let update = Update::new()
            .set(Assignment::Status(to))
            .set(Assignment::StatusAt(Utc::now()));
        self.transition(operation, execution_id, Filter::status(from), update)
            .await
    }

    /// `assigned` to `starting`, once the runner has accepted the execution.
    pub async fn start(&self, execution_id: &str) -> AppResult<Option<Execution>> {
        self.simple(
            "start",
            execution_id,
            ExecutionStatus::Assigned,
            ExecutionStatus::Starting,
        )
        .await
    }

    /// `running` to `pausing`; the runner reports back when steps are paused.
    pub async fn pause(&self, execution_id: &str) -> AppResult<Option<Execution>> {
        self.simple(
            "pause",
            execution_id,
            ExecutionStatus::Running,
            ExecutionStatus::Pausing,
        )
        .await
    }

    /// `paused` to `resuming`.
    pub async fn resume(&self, execution_id: &str) -> AppResult<Option<Execution>> {
        self.simple(
            "resume",
            execution_id,
            ExecutionStatus::Paused,
            ExecutionStatus::Resuming,
        )
        .await
    }

    /// Request an abort. Started executions go to `stopping`; executions that
    /// never started end as `aborted` right away.
    pub async fn abort(&self, execution_id: &str) -> AppResult<Option<Execution>> {
        self.stop("abort", execution_id, ExecutionStatus::Aborted)
            .await
    }

    /// Like [`Controller::abort`], ending as `canceled`.
    pub async fn cancel(&self, execution_id: &str) -> AppResult<Option<Execution>> {
        self.stop("cancel", execution_id, ExecutionStatus::Canceled)
            .await
    }

    async fn stop(
        &self,
        operation: &'static str,
        execution_id: &str,
        terminal: ExecutionStatus,
    ) -> AppResult<Option<Execution>> {
        let now = Utc::now();
        let running = Filter::status_in(&STOPPABLE);
        let not_started = Filter::status_in_or_missing(&NOT_STARTED);

        // one atomic write covers both paths; the branch is picked on the stored status
        let update = Update::new()
            .set_when(
                Assignment::Status(ExecutionStatus::Stopping),
                running.clone(),
            )
            .set_when(Assignment::Status(terminal), not_started.clone())
            .set_when(Assignment::FinishedAt(now), not_started.clone())
            .set(Assignment::PredictedStatus(terminal))
            .set(Assignment::StatusAt(now));

        self.transition(
            operation,
            execution_id,
            Filter::Or(vec![running, not_started]),
            update,
        )
        .await
    }

    /// Cancel immediately, without waiting for the runner. Used to recover
    /// executions whose runner is gone.
    pub async fn force_cancel(&self, execution_id: &str) -> AppResult<Option<Execution>> {
        let now = Utc::now();
        let update = Update::new()
            .set(Assignment::StatusAt(now))
            .set(Assignment::FinishedAt(now))
            .set(Assignment::Status(ExecutionStatus::Canceled))
            .set(Assignment::PredictedStatus(ExecutionStatus::Canceled))
            .cancel_steps(now);

        self.transition(
            "force_cancel",
            execution_id,
            Filter::status_in_or_missing(&ExecutionStatus::non_terminal()),
            update,
        )
        .await
    }
}
