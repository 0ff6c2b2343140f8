//! Execution and step status enumerations.

use serde::{Deserialize, Serialize};

/// Coarse lifecycle status of an execution.
///
/// `queued → assigned → starting → scheduling → running ⇄ pausing ⇄ paused ⇄ resuming
/// → stopping → {aborted, canceled, failed, passed}`. `timeout` is terminal as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Queued,
    Assigned,
    Starting,
    Scheduling,
    Running,
    Pausing,
    Paused,
    Resuming,
    Stopping,
    Passed,
    Failed,
    Aborted,
    Canceled,
    Timeout,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 14] = [
        Self::Queued,
        Self::Assigned,
        Self::Starting,
        Self::Scheduling,
        Self::Running,
        Self::Pausing,
        Self::Paused,
        Self::Resuming,
        Self::Stopping,
        Self::Passed,
        Self::Failed,
        Self::Aborted,
        Self::Canceled,
        Self::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Assigned => "assigned",
            Self::Starting => "starting",
            Self::Scheduling => "scheduling",
            Self::Running => "running",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Resuming => "resuming",
            Self::Stopping => "stopping",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
            Self::Canceled => "canceled",
            Self::Timeout => "timeout",
        }
    }

    /// Parse a status name; `None` for anything unknown.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.as_str() == s)
    }

    /// Whether the execution has settled.
    ///
    /// Only the terminal statuses count. `assigned`, `starting` and `stopping` are
    /// deliberately not finished: "stop requested" is not "stopped".
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Passed | Self::Failed | Self::Aborted | Self::Canceled | Self::Timeout
        )
    }

    /// Statuses that a force-cancel may still act upon.
    pub fn non_terminal() -> Vec<ExecutionStatus> {
        Self::ALL
            .iter()
            .copied()
            .filter(|s| !s.is_finished())
            .collect()
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Queued,
    Running,
    Paused,
    Passed,
    Failed,
    Timeout,
    Skipped,
    Aborted,
    Canceled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Skipped => "skipped",
            Self::Aborted => "aborted",
            Self::Canceled => "canceled",
        }
    }

    /// Anything except queued/running/paused has settled.
    pub fn finished(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running | Self::Paused)
    }

    /// Failure that counts against the parent group.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Timeout)
    }

    /// Passed and failed steps keep their status through a force-cancel.
    pub fn is_conclusive(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Helpers for the optional status stored on a step; an empty status means "not queued yet".
pub trait OptionalStepStatus {
    fn finished(&self) -> bool;
    fn in_flight(&self) -> bool;
    fn is(&self, status: StepStatus) -> bool;
}

impl OptionalStepStatus for Option<StepStatus> {
    fn finished(&self) -> bool {
        self.map(|s| s.finished()).unwrap_or(false)
    }

    fn in_flight(&self) -> bool {
        !self.finished()
    }

    fn is(&self, status: StepStatus) -> bool {
        *self == Some(status)
    }
}
