//! Work assignment for polling runners.

use std::sync::Arc;

use chrono::Utc;

use crate::db::{Assignment, ExecutionStore, Field, Filter, ReturnDocument, Sort, Update};
use crate::error::{AppError, AppResult};
use crate::model::{Execution, ExecutionStatus, Runner};

/// Statuses a runner may (re)claim an execution in.
const CLAIMABLE: [ExecutionStatus; 3] = [
    ExecutionStatus::Queued,
    ExecutionStatus::Assigned,
    ExecutionStatus::Starting,
];

/// Hands out queued executions, oldest first.
///
/// A runner that polls again gets back the execution it already owns, so a
/// crashed or retrying runner does not lose its work. Exclusivity comes from
/// the store's single-document atomic update; there is no other locking.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn ExecutionStore>,
    admission: Option<Filter>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            store,
            admission: None,
        }
    }

    /// Restrict which executions this scheduler may hand out. The filter is
    /// evaluated inside the same atomic claim.
    pub fn with_admission(mut self, filter: Filter) -> Self {
        self.admission = Some(filter);
        self
    }

    fn claim_filter(&self, runner: &Runner) -> Filter {
        let filter = Filter::status_in_or_missing(&CLAIMABLE).and(Filter::Or(vec![
            Filter::MissingOrEmpty(Field::RunnerId),
            Filter::runner(runner.id.as_str()),
        ]));
        match &self.admission {
            Some(admission) => filter.and(admission.clone()),
            None => filter,
        }
    }

    fn claim_update(runner: &Runner) -> Update {
        let now = Utc::now();
        let fresh = Filter::status_in_or_missing(&[ExecutionStatus::Queued]);
        Update::new()
            .set_when(Assignment::Status(ExecutionStatus::Assigned), fresh.clone())
            .set_when(Assignment::StatusAt(now), fresh)
            .set_when(
                Assignment::AssignedAt(now),
                !Filter::runner(runner.id.as_str()),
            )
            .set(Assignment::RunnerId(runner.id.clone()))
    }

    /// Claim the next execution for `runner`. `Ok(None)` means there is no
    /// eligible work right now.
    pub async fn schedule(&self, runner: &Runner) -> AppResult<Option<Execution>> {
        if runner.id.is_empty() {
            return Err(AppError::Validation("runner id must not be empty".to_string()));
        }

        let claimed = self
            .store
            .find_one_and_update(
                &self.claim_filter(runner),
                &Self::claim_update(runner),
                Some(Sort::ScheduledAtAsc),
                ReturnDocument::After,
            )
            .await
            .map_err(|e| AppError::query("schedule", e))?;

        match &claimed {
            Some(execution) => tracing::info!(
                execution_id = %execution.id,
                runner_id = %runner.id,
                status = %execution.status(),
                "Execution assigned"
            ),
            None => tracing::debug!(runner_id = %runner.id, "No execution to assign"),
        }
        Ok(claimed)
    }
}
