//! Status derivation for groups and for the execution as a whole.

use crate::model::{ExecutionStatus, OptionalStepStatus, StepStatus};

/// What a group knows about its direct children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildSummary {
    pub any_aborted: bool,
    pub any_canceled: bool,
    /// A non-optional child failed or timed out.
    pub any_required_failure: bool,
    pub all_skipped: bool,
    pub any_in_flight: bool,
    pub any_paused: bool,
    pub any_started: bool,
}

/// A child as seen by its parent.
#[derive(Debug, Clone, Copy)]
pub struct ChildView {
    pub status: Option<StepStatus>,
    pub optional: bool,
    pub started: bool,
}

impl ChildSummary {
    pub fn collect(children: impl IntoIterator<Item = ChildView>) -> Self {
        let mut summary = ChildSummary {
            all_skipped: true,
            ..Default::default()
        };
        let mut count = 0usize;
        for child in children {
            count += 1;
            let status = child.status;
            summary.any_aborted |= status.is(StepStatus::Aborted);
            summary.any_canceled |= status.is(StepStatus::Canceled);
            summary.any_required_failure |=
                !child.optional && status.map(|s| s.is_failure()).unwrap_or(false);
            summary.all_skipped &= status.is(StepStatus::Skipped);
            summary.any_in_flight |= status.in_flight();
            summary.any_paused |= status.is(StepStatus::Paused);
            summary.any_started |= child.started;
        }
        if count == 0 {
            summary.all_skipped = false;
        }
        summary
    }

    /// Terminal status of a settled group.
    ///
    /// Aborts dominate, then cancellations. A group whose children were all skipped
    /// is skipped, negative or not. Otherwise the required-failure flag decides,
    /// inverted for negative groups.
    pub fn settle(&self, negative: bool) -> StepStatus {
        if self.any_aborted {
            return StepStatus::Aborted;
        }
        if self.any_canceled {
            return StepStatus::Canceled;
        }
        if self.all_skipped {
            return StepStatus::Skipped;
        }
        let failed = self.any_required_failure != negative;
        if failed {
            StepStatus::Failed
        } else {
            StepStatus::Passed
        }
    }

    /// Status of a group that still has children in flight.
    pub fn progress(&self) -> Option<StepStatus> {
        if self.any_paused {
            Some(StepStatus::Paused)
        } else if self.any_started {
            Some(StepStatus::Running)
        } else {
            None
        }
    }

    /// Best guess of the terminal execution status, treating the summarised
    /// nodes as one implicit (non-negative) root group.
    pub fn predict(&self) -> ExecutionStatus {
        if self.any_aborted {
            ExecutionStatus::Aborted
        } else if self.any_canceled {
            ExecutionStatus::Canceled
        } else if self.any_required_failure {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Passed
        }
    }
}

/// Initialization outcomes that end the execution on their own.
pub fn initialization_verdict(status: Option<StepStatus>) -> Option<ExecutionStatus> {
    match status {
        Some(StepStatus::Aborted) => Some(ExecutionStatus::Aborted),
        Some(StepStatus::Failed) => Some(ExecutionStatus::Failed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(status: StepStatus) -> ChildView {
        ChildView {
            status: Some(status),
            optional: false,
            started: true,
        }
    }

    #[test]
    fn test_negative_group_inverts_failure() {
        let failed = ChildSummary::collect([child(StepStatus::Failed)]);
        assert_eq!(failed.settle(true), StepStatus::Passed);
        let passed = ChildSummary::collect([child(StepStatus::Passed)]);
        assert_eq!(passed.settle(true), StepStatus::Failed);
    }

    #[test]
    fn test_negative_group_keeps_aborted_and_skipped() {
        let aborted = ChildSummary::collect([child(StepStatus::Aborted)]);
        assert_eq!(aborted.settle(true), StepStatus::Aborted);
        let skipped = ChildSummary::collect([child(StepStatus::Skipped)]);
        assert_eq!(skipped.settle(true), StepStatus::Skipped);
    }

    #[test]
    fn test_optional_failure_is_ignored() {
        let summary = ChildSummary::collect([
            ChildView {
                optional: true,
                ..child(StepStatus::Failed)
            },
            child(StepStatus::Passed),
        ]);
        assert_eq!(summary.settle(false), StepStatus::Passed);
    }

    #[test]
    fn test_timeout_counts_as_failure() {
        let summary = ChildSummary::collect([child(StepStatus::Passed), child(StepStatus::Timeout)]);
        assert_eq!(summary.settle(false), StepStatus::Failed);
        assert_eq!(summary.predict(), ExecutionStatus::Failed);
    }

    #[test]
    fn test_in_flight_children_report_progress() {
        let summary = ChildSummary::collect([
            child(StepStatus::Passed),
            ChildView {
                status: Some(StepStatus::Queued),
                optional: false,
                started: false,
            },
        ]);
        assert!(summary.any_in_flight);
        assert_eq!(summary.progress(), Some(StepStatus::Running));
    }

    #[test]
    fn test_initialization_verdict() {
        assert_eq!(
            initialization_verdict(Some(StepStatus::Failed)),
            Some(ExecutionStatus::Failed)
        );
        assert_eq!(initialization_verdict(Some(StepStatus::Passed)), None);
        assert_eq!(initialization_verdict(None), None);
    }
}
