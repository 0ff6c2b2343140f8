//! Execution documents as stored by the persistence layer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signature::Signature;
use super::status::{ExecutionStatus, StepStatus};

/// Reference used for the engine bootstrap step in step reports.
pub const INIT_STEP_REF: &str = "init";

/// Identity of a worker process polling for executions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runner {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub environment: String,
}

impl Runner {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            environment: String::new(),
        }
    }
}

/// One schedulable, stateful run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Owning runner; `None` or empty means unassigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_id: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signature: Vec<Signature>,
    #[serde(default)]
    pub result: ExecutionResult,
}

impl Execution {
    /// Build a freshly queued execution.
    pub fn queued(id: impl Into<String>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            runner_id: None,
            scheduled_at,
            assigned_at: None,
            status_at: Some(scheduled_at),
            signature: Vec::new(),
            result: ExecutionResult {
                status: Some(ExecutionStatus::Queued),
                predicted_status: Some(ExecutionStatus::Passed),
                queued_at: Some(scheduled_at),
                ..Default::default()
            },
        }
    }

    pub fn with_signature(mut self, signature: Vec<Signature>) -> Self {
        self.signature = signature;
        self
    }

    /// Current status; a never-set status reads as `queued`.
    pub fn status(&self) -> ExecutionStatus {
        self.result.status.unwrap_or(ExecutionStatus::Queued)
    }

    pub fn runner(&self) -> Option<&str> {
        self.runner_id.as_deref().filter(|r| !r.is_empty())
    }
}

/// Aggregate outcome of an execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_status: Option<ExecutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Active duration (paused time excluded), rendered for display.
    #[serde(default)]
    pub duration: String,
    /// Wall-clock duration including paused time, rendered for display.
    #[serde(default)]
    pub total_duration: String,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub total_duration_ms: i64,
    #[serde(default)]
    pub paused_ms: i64,
    #[serde(default)]
    pub initialization: StepResult,
    #[serde(default)]
    pub steps: HashMap<String, StepResult>,
    #[serde(default)]
    pub pauses: Vec<PauseInterval>,
}

impl ExecutionResult {
    pub fn is_status(&self, status: ExecutionStatus) -> bool {
        self.status.unwrap_or(ExecutionStatus::Queued) == status
    }

    /// Finished means both a terminal status and a finish timestamp.
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some() && self.status.map(|s| s.is_finished()).unwrap_or(false)
    }

    pub fn step(&self, reference: &str) -> Option<&StepResult> {
        if reference == INIT_STEP_REF {
            return Some(&self.initialization);
        }
        self.steps.get(reference)
    }

    /// Latest timestamp recorded anywhere in the result.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        std::iter::once(&self.initialization)
            .chain(self.steps.values())
            .flat_map(|s| [s.queued_at, s.started_at, s.finished_at])
            .chain([self.queued_at, self.started_at, self.finished_at])
            .flatten()
            .max()
    }
}

/// Per-step outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StepResult {
    pub fn with_status(status: StepStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Last known point in time for this step: finished, else started, else queued.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.finished_at.or(self.started_at).or(self.queued_at)
    }

    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
            || self.finished_at.is_some()
            || matches!(
                self.status,
                Some(s) if s != StepStatus::Queued
            )
    }
}

/// A `[paused_at, resumed_at)` window; `resumed_at == None` marks an open interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseInterval {
    #[serde(rename = "ref")]
    pub reference: String,
    pub paused_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_at: Option<DateTime<Utc>>,
}

/// Producer-side request to enqueue an execution.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NewExecution {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signature: Vec<Signature>,
}

/// Runner-side progress report for one step (or the initialization step).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StepReport {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub status: Option<StepStatus>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl StepReport {
    /// Merge the reported fields into a stored step; absent fields are left untouched.
    pub fn merge_into(&self, step: &mut StepResult) {
        if self.status.is_some() {
            step.status = self.status;
        }
        if self.exit_code.is_some() {
            step.exit_code = self.exit_code;
        }
        if self.queued_at.is_some() {
            step.queued_at = self.queued_at;
        }
        if self.started_at.is_some() {
            step.started_at = self.started_at;
        }
        if self.finished_at.is_some() {
            step.finished_at = self.finished_at;
        }
        if self.error_message.is_some() {
            step.error_message = self.error_message.clone();
        }
    }
}
