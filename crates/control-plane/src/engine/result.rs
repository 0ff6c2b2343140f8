//! Result recomputation.
//!
//! The engine is a pure transformation over an in-memory [`ExecutionResult`].
//! It performs no locking; callers serialise recomputes per execution.

use chrono::{DateTime, Utc};

use super::pauses;
use super::status::{initialization_verdict, ChildSummary, ChildView};
use super::timeline;
use super::tree::{NodeId, SignatureTree};
use crate::model::{
    Execution, ExecutionResult, ExecutionStatus, OptionalStepStatus, Signature, StepReport,
    StepResult, StepStatus, INIT_STEP_REF,
};

/// Recomputes statuses, timings and durations of one execution's result.
#[derive(Debug, Clone)]
pub struct ResultEngine {
    tree: SignatureTree,
    scheduled_at: DateTime<Utc>,
}

impl ResultEngine {
    pub fn new(signature: &[Signature], scheduled_at: DateTime<Utc>) -> Self {
        Self {
            tree: SignatureTree::build(signature),
            scheduled_at,
        }
    }

    pub fn for_execution(execution: &Execution) -> Self {
        Self::new(&execution.signature, execution.scheduled_at)
    }

    pub fn tree(&self) -> &SignatureTree {
        &self.tree
    }

    /// Bring every derived field of `result` up to date with the reported step data.
    pub fn recompute(&self, result: &mut ExecutionResult) {
        pauses::heal_missing_pause_statuses(result);
        if result.finished_at.is_some() {
            self.skip_untouched(result);
        }
        self.derive_groups(result);
        self.stamp_started(result);
        timeline::calibrate(result, &self.tree, self.scheduled_at);
        pauses::recompute_duration(result, self.scheduled_at);
        self.resolve_status(result);
    }

    /// Merge a runner report into the result. Returns `false` for references the
    /// signature does not know about; those reports are ignored.
    pub fn apply_report(&self, result: &mut ExecutionResult, report: &StepReport) -> bool {
        if report.reference == INIT_STEP_REF {
            report.merge_into(&mut result.initialization);
            return true;
        }
        if self.tree.find(&report.reference).is_none() {
            return false;
        }
        let step = result.steps.entry(report.reference.clone()).or_default();
        report.merge_into(step);
        true
    }

    pub fn pause_start(&self, result: &mut ExecutionResult, reference: &str, at: DateTime<Utc>) -> bool {
        pauses::pause_start(result, reference, at)
    }

    pub fn pause_end(&self, result: &mut ExecutionResult, reference: &str, at: DateTime<Utc>) -> bool {
        pauses::pause_end(result, reference, at)
    }

    /// Terminal report from the runner.
    ///
    /// When a stop was requested, the steps the runner left unfinished are
    /// closed as aborted or canceled before the final recompute.
    pub fn finish(&self, result: &mut ExecutionResult, at: DateTime<Utc>) {
        if result.finished_at.is_none() {
            result.finished_at = Some(at);
        }
        if let Some(stopped) = requested_stop(result) {
            self.heal_stopped(result, stopped, at);
        }
        self.recompute(result);
    }

    /// Drive the execution to a terminal state after an infrastructure failure.
    ///
    /// Initialization and every running or paused step become failed (aborted when
    /// `aborted` is set); steps that never started are skipped. The predicted
    /// status is `failed` either way.
    pub fn fatal(&self, result: &mut ExecutionResult, message: &str, aborted: bool, at: DateTime<Utc>) {
        let (status, step_status) = if aborted {
            (ExecutionStatus::Aborted, StepStatus::Aborted)
        } else {
            (ExecutionStatus::Failed, StepStatus::Failed)
        };

        result.initialization.error_message = Some(message.to_string());
        result.status = Some(status);
        // the run itself did not succeed, whatever stopped it
        result.predicted_status = Some(ExecutionStatus::Failed);
        result.queued_at.get_or_insert(at);
        result.started_at.get_or_insert(at);
        let finished_at = *result.finished_at.get_or_insert(at);

        if !result.initialization.status.finished() {
            result.initialization.status = Some(step_status);
            result.initialization.finished_at = Some(finished_at);
        }

        for step in result.steps.values_mut() {
            match step.status {
                None | Some(StepStatus::Queued) => step.status = Some(StepStatus::Skipped),
                Some(StepStatus::Running) | Some(StepStatus::Paused) => {
                    step.status = Some(step_status);
                    step.finished_at.get_or_insert(finished_at);
                }
                _ => {}
            }
        }

        pauses::recompute_duration(result, self.scheduled_at);
    }

    /// First leaf that has been queued but has not finished, while the execution runs.
    pub fn current_step<'a>(&'a self, result: &ExecutionResult) -> Option<&'a str> {
        if !result.is_status(ExecutionStatus::Running) {
            return None;
        }
        self.tree
            .leaves()
            .into_iter()
            .map(|id| self.tree.node(id).reference.as_str())
            .find(|reference| {
                result
                    .steps
                    .get(*reference)
                    .map(|s| s.queued_at.is_some() && s.finished_at.is_none())
                    .unwrap_or(false)
            })
    }

    /// Close out a stopped execution: the first unfinished leaf (or a started but
    /// unfinished initialization) takes the stop status, every later unfinished
    /// leaf is skipped. Leaves that settled on their own keep their status.
    fn heal_stopped(&self, result: &mut ExecutionResult, stopped: StepStatus, at: DateTime<Utc>) {
        let message = format!("The execution has been {}.", stopped);
        let skipped_message = format!("The execution was {} before.", stopped);
        let mut closed = false;

        let init = &mut result.initialization;
        if init.has_started() && !init.status.finished() {
            init.status = Some(stopped);
            init.error_message = Some(message.clone());
            init.finished_at.get_or_insert(at);
            closed = true;
        }

        for leaf in self.tree.leaves() {
            let step = result
                .steps
                .entry(self.tree.node(leaf).reference.clone())
                .or_default();
            let stop_status =
                step.status.is(StepStatus::Aborted) || step.status.is(StepStatus::Canceled);
            if step.status.finished() && !stop_status {
                continue;
            }
            if closed {
                step.status = Some(StepStatus::Skipped);
                step.error_message = Some(skipped_message.clone());
            } else {
                let started = step.has_started();
                step.status = Some(stopped);
                step.error_message = Some(message.clone());
                if started {
                    step.finished_at.get_or_insert(at);
                }
                closed = true;
            }
        }
    }

    /// Once the execution has finished, leaves that never ran are skipped.
    fn skip_untouched(&self, result: &mut ExecutionResult) {
        for leaf in self.tree.leaves() {
            let step = result
                .steps
                .entry(self.tree.node(leaf).reference.clone())
                .or_default();
            if matches!(step.status, None | Some(StepStatus::Queued)) && !step.has_started() {
                step.status = Some(StepStatus::Skipped);
            }
        }
    }

    fn child_view(&self, result: &ExecutionResult, id: NodeId) -> ChildView {
        let node = self.tree.node(id);
        let step = result.steps.get(&node.reference);
        ChildView {
            status: step.and_then(|s| s.status),
            optional: node.optional,
            started: step.map(StepResult::has_started).unwrap_or(false),
        }
    }

    /// Like [`Self::child_view`], but an unsettled group already carries the worst
    /// outcome visible below it: aborted, then canceled, then a required failure
    /// (ignored inside negative groups).
    fn omen_view(&self, result: &ExecutionResult, id: NodeId) -> ChildView {
        let mut view = self.child_view(result, id);
        let node = self.tree.node(id);
        if !node.is_group() || view.status.finished() {
            return view;
        }
        let below =
            ChildSummary::collect(node.children.iter().map(|&c| self.omen_view(result, c)));
        if below.any_aborted {
            view.status = Some(StepStatus::Aborted);
        } else if below.any_canceled {
            view.status = Some(StepStatus::Canceled);
        } else if below.any_required_failure && !node.negative {
            view.status = Some(StepStatus::Failed);
        }
        view
    }

    fn derive_groups(&self, result: &mut ExecutionResult) {
        for id in self.tree.post_order() {
            let node = self.tree.node(id);
            if !node.is_group() {
                continue;
            }
            let existing = result.steps.get(&node.reference).and_then(|s| s.status);
            // internal failure of the group itself
            if existing.is(StepStatus::Failed) {
                continue;
            }
            let known = node
                .children
                .iter()
                .any(|&c| result.steps.contains_key(&self.tree.node(c).reference));
            if !known && existing.is_none() {
                continue;
            }

            let summary =
                ChildSummary::collect(node.children.iter().map(|&c| self.child_view(result, c)));
            let status = if summary.any_in_flight {
                summary
                    .progress()
                    .or(existing.filter(|s| !s.finished()))
                    .unwrap_or(StepStatus::Queued)
            } else {
                summary.settle(node.negative)
            };
            result.steps.entry(node.reference.clone()).or_default().status = Some(status);
        }
    }

    fn stamp_started(&self, result: &mut ExecutionResult) {
        if result.started_at.is_some() {
            return;
        }
        result.started_at = std::iter::once(&result.initialization)
            .chain(result.steps.values())
            .filter_map(|s| s.started_at.or(s.queued_at))
            .min();
    }

    fn any_started(&self, result: &ExecutionResult) -> bool {
        result.started_at.is_some()
            || result.initialization.has_started()
            || result.steps.values().any(StepResult::has_started)
    }

    fn any_paused(&self, result: &ExecutionResult) -> bool {
        result.initialization.status.is(StepStatus::Paused)
            || result.steps.values().any(|s| s.status.is(StepStatus::Paused))
    }

    fn resolve_status(&self, result: &mut ExecutionResult) {
        let current = result.status.unwrap_or(ExecutionStatus::Queued);
        // already settled, e.g. by a force-cancel or a queued abort
        if current.is_finished() {
            return;
        }

        if let Some(verdict) = initialization_verdict(result.initialization.status) {
            result.predicted_status = Some(verdict);
            result.status = Some(verdict);
            return;
        }

        let summary = ChildSummary::collect(
            self.tree
                .roots()
                .iter()
                .map(|&id| self.omen_view(result, id)),
        );
        let derived = summary.predict();

        // a pending stop request decides the terminal status
        let requested = match (current, result.predicted_status) {
            (ExecutionStatus::Stopping, Some(p @ ExecutionStatus::Aborted))
            | (ExecutionStatus::Stopping, Some(p @ ExecutionStatus::Canceled)) => Some(p),
            _ => None,
        };
        let predicted = requested.unwrap_or(derived);
        result.predicted_status = Some(predicted);

        if result.finished_at.is_some() || (requested.is_none() && derived == ExecutionStatus::Aborted) {
            result.status = Some(predicted);
            return;
        }

        let paused = self.any_paused(result);
        let started = self.any_started(result);
        result.status = Some(match current {
            ExecutionStatus::Stopping => ExecutionStatus::Stopping,
            ExecutionStatus::Pausing if paused => ExecutionStatus::Paused,
            ExecutionStatus::Pausing => ExecutionStatus::Pausing,
            ExecutionStatus::Resuming if paused => ExecutionStatus::Resuming,
            ExecutionStatus::Resuming => ExecutionStatus::Running,
            _ if paused => ExecutionStatus::Paused,
            _ if started => ExecutionStatus::Running,
            other => other,
        });
    }
}

/// Step status a pending stop request settles unfinished steps with.
fn requested_stop(result: &ExecutionResult) -> Option<StepStatus> {
    if !result.is_status(ExecutionStatus::Stopping) {
        return None;
    }
    match result.predicted_status {
        Some(ExecutionStatus::Aborted) => Some(StepStatus::Aborted),
        Some(ExecutionStatus::Canceled) => Some(StepStatus::Canceled),
        _ => None,
    }
}
