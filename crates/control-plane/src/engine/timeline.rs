//! Timestamp calibration.
//!
//! Steps report asynchronously and may race each other. Calibration floors every
//! timestamp so that the leaf steps form a non-decreasing timeline in
//! declaration order, and lets groups inherit their bounds from their leaves.

use chrono::{DateTime, Utc};

use super::tree::SignatureTree;
use crate::model::{ExecutionResult, OptionalStepStatus, StepResult};

pub fn calibrate(result: &mut ExecutionResult, tree: &SignatureTree, scheduled_at: DateTime<Utc>) {
    let queued_at = result.queued_at.unwrap_or(scheduled_at).max(scheduled_at);
    result.queued_at = Some(queued_at);
    if let Some(started_at) = result.started_at {
        result.started_at = Some(started_at.max(queued_at));
    }

    floor_step(&mut result.initialization, Some(queued_at));
    let mut last = result.initialization.last_timestamp();

    for leaf in tree.leaves() {
        let Some(step) = result.steps.get_mut(&tree.node(leaf).reference) else {
            continue;
        };
        floor_step(step, last);
        last = step.last_timestamp().or(last);
    }

    for id in tree.post_order() {
        let node = tree.node(id);
        if !node.is_group() || !result.steps.contains_key(&node.reference) {
            continue;
        }
        let leaves: Vec<&StepResult> = tree
            .descendant_leaves(id)
            .into_iter()
            .filter_map(|leaf| result.steps.get(&tree.node(leaf).reference))
            .collect();
        let queued = leaves.iter().find_map(|s| s.queued_at);
        let started = leaves.iter().find_map(|s| s.started_at);
        let finished = leaves.iter().rev().find_map(|s| s.finished_at);

        if let Some(group) = result.steps.get_mut(&node.reference) {
            group.queued_at = queued.or(group.queued_at);
            group.started_at = started.or(group.started_at);
            if group.status.finished() {
                group.finished_at = finished.or(group.finished_at);
            }
        }
    }
}

/// Floor a step's own timestamps: `floor ≤ queued_at ≤ started_at ≤ finished_at`.
pub fn floor_step(step: &mut StepResult, floor: Option<DateTime<Utc>>) {
    if step.queued_at.is_none() && (step.started_at.is_some() || step.finished_at.is_some()) {
        step.queued_at = step.started_at.or(step.finished_at);
    }
    if let (Some(queued), Some(floor)) = (step.queued_at, floor) {
        step.queued_at = Some(queued.max(floor));
    }
    if step.finished_at.is_some() && step.started_at.is_none() {
        step.started_at = step.queued_at;
    }
    if let (Some(started), Some(queued)) = (step.started_at, step.queued_at) {
        step.started_at = Some(started.max(queued));
    }
    if let (Some(finished), Some(lower)) = (step.finished_at, step.started_at.or(step.queued_at)) {
        step.finished_at = Some(finished.max(lower));
    }
}
