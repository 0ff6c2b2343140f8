//! Document updates applied atomically by [`super::ExecutionStore::find_one_and_update`].

use chrono::{DateTime, Utc};

use super::filter::Filter;
use super::store::StoreResult;
use crate::model::{Execution, ExecutionResult, ExecutionStatus, StepStatus};

/// A single field write.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Status(ExecutionStatus),
    PredictedStatus(ExecutionStatus),
    RunnerId(String),
    StatusAt(DateTime<Utc>),
    AssignedAt(DateTime<Utc>),
    FinishedAt(DateTime<Utc>),
}

impl Assignment {
    fn apply(&self, execution: &mut Execution) {
        match self {
            Assignment::Status(status) => execution.result.status = Some(*status),
            Assignment::PredictedStatus(status) => {
                execution.result.predicted_status = Some(*status)
            }
            Assignment::RunnerId(runner_id) => execution.runner_id = Some(runner_id.clone()),
            Assignment::StatusAt(at) => execution.status_at = Some(*at),
            Assignment::AssignedAt(at) => execution.assigned_at = Some(*at),
            Assignment::FinishedAt(at) => execution.result.finished_at = Some(*at),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(Assignment),
    /// Applied only when `when` matches the document as it was before the update.
    SetWhen { assignment: Assignment, when: Filter },
    /// Every step that did not pass or fail becomes canceled; missing timestamps
    /// are backfilled with `at`.
    CancelSteps(DateTime<Utc>),
    ReplaceResult(Box<ExecutionResult>),
}

/// Ordered list of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, assignment: Assignment) -> Self {
        self.ops.push(UpdateOp::Set(assignment));
        self
    }

    pub fn set_when(mut self, assignment: Assignment, when: Filter) -> Self {
        self.ops.push(UpdateOp::SetWhen { assignment, when });
        self
    }

    pub fn cancel_steps(mut self, at: DateTime<Utc>) -> Self {
        self.ops.push(UpdateOp::CancelSteps(at));
        self
    }

    pub fn replace_result(mut self, result: ExecutionResult) -> Self {
        self.ops.push(UpdateOp::ReplaceResult(Box::new(result)));
        self
    }

    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn validate(&self) -> StoreResult<()> {
        self.ops.iter().try_for_each(|op| match op {
            UpdateOp::SetWhen { when, .. } => when.validate(),
            _ => Ok(()),
        })
    }

    pub fn apply(&self, execution: &mut Execution) {
        let before = self
            .ops
            .iter()
            .any(|op| matches!(op, UpdateOp::SetWhen { .. }))
            .then(|| execution.clone());

        for op in &self.ops {
            match op {
                UpdateOp::Set(assignment) => assignment.apply(execution),
                UpdateOp::SetWhen { assignment, when } => {
                    if before.as_ref().is_some_and(|doc| when.matches(doc)) {
                        assignment.apply(execution);
                    }
                }
                UpdateOp::CancelSteps(at) => cancel_steps(&mut execution.result, *at),
                UpdateOp::ReplaceResult(result) => execution.result = (**result).clone(),
            }
        }
    }
}

fn cancel_steps(result: &mut ExecutionResult, at: DateTime<Utc>) {
    for step in result.steps.values_mut() {
        if !step.status.is_some_and(|s| s.is_conclusive()) {
            step.status = Some(StepStatus::Canceled);
        }
        step.queued_at.get_or_insert(at);
        step.started_at.get_or_insert(at);
        step.finished_at.get_or_insert(at);
    }
}
