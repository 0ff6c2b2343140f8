//! Pause interval bookkeeping and duration accounting.

use chrono::{DateTime, Duration, Utc};

use crate::model::{ExecutionResult, OptionalStepStatus, PauseInterval, StepStatus, INIT_STEP_REF};

/// Whether an interval for `reference` already covers `at`.
pub fn has_pause_at(result: &ExecutionResult, reference: &str, at: DateTime<Utc>) -> bool {
    result.pauses.iter().any(|p| {
        p.reference == reference && p.paused_at <= at && p.resumed_at.map_or(true, |r| r >= at)
    })
}

pub fn has_open_pause(result: &ExecutionResult, reference: &str) -> bool {
    result
        .pauses
        .iter()
        .any(|p| p.reference == reference && p.resumed_at.is_none())
}

/// Record the start of a pause. A request inside an interval that already covers
/// `at` for the same reference is a no-op.
pub fn pause_start(result: &mut ExecutionResult, reference: &str, at: DateTime<Utc>) -> bool {
    if has_pause_at(result, reference, at) {
        return false;
    }
    result.pauses.push(PauseInterval {
        reference: reference.to_string(),
        paused_at: at,
        resumed_at: None,
    });
    if let Some(step) = step_mut(result, reference) {
        if !step.status.finished() {
            step.status = Some(StepStatus::Paused);
        }
    }
    true
}

/// Close the first interval for `reference` that could contain `at`.
///
/// Repeating the call with the same timestamp is harmless, and closing a pause that
/// was never opened does nothing.
pub fn pause_end(result: &mut ExecutionResult, reference: &str, at: DateTime<Utc>) -> bool {
    if !has_pause_at(result, reference, at) {
        return false;
    }
    let mut closed = false;
    for pause in result.pauses.iter_mut().filter(|p| p.reference == reference) {
        if pause.paused_at > at {
            continue;
        }
        match pause.resumed_at {
            // already covered by a closed window
            Some(resumed) if resumed >= at => break,
            None => {
                pause.resumed_at = Some(at);
                closed = true;
                break;
            }
            Some(_) => continue,
        }
    }
    if closed && !has_open_pause(result, reference) {
        if let Some(step) = step_mut(result, reference) {
            if step.status.is(StepStatus::Paused) {
                step.status = Some(StepStatus::Running);
            }
        }
    }
    closed
}

/// Mark a non-finished step with an open pause interval as paused.
pub fn heal_missing_pause_statuses(result: &mut ExecutionResult) {
    let open: Vec<String> = result
        .pauses
        .iter()
        .filter(|p| p.resumed_at.is_none())
        .map(|p| p.reference.clone())
        .collect();
    for reference in open {
        if let Some(step) = step_mut(result, &reference) {
            if !step.status.finished() {
                step.status = Some(StepStatus::Paused);
            }
        }
    }
}

/// Recompute `paused_ms`, `duration` and `total_duration`. Only a finished
/// execution has durations.
pub fn recompute_duration(result: &mut ExecutionResult, scheduled_at: DateTime<Utc>) {
    let Some(finished_at) = result.finished_at else {
        return;
    };

    let mut windows: Vec<(DateTime<Utc>, DateTime<Utc>)> = result
        .pauses
        .iter()
        .map(|p| (p.paused_at, p.resumed_at.unwrap_or(finished_at)))
        .filter(|(start, end)| end > start)
        .collect();
    windows.sort();

    // overlapping windows (different refs pausing together) count once
    let mut paused = Duration::zero();
    let mut current: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
    for (start, end) in windows {
        current = match current {
            Some((cs, ce)) if start <= ce => Some((cs, ce.max(end))),
            Some((cs, ce)) => {
                paused += ce - cs;
                Some((start, end))
            }
            None => Some((start, end)),
        };
    }
    if let Some((cs, ce)) = current {
        paused += ce - cs;
    }

    let queued_at = result.queued_at.unwrap_or(scheduled_at);
    let total = (finished_at - queued_at).max(Duration::zero());
    let active = (total - paused).max(Duration::zero());

    result.paused_ms = paused.num_milliseconds();
    result.total_duration_ms = total.num_milliseconds();
    result.duration_ms = active.num_milliseconds();
    result.total_duration = format_duration(total);
    result.duration = format_duration(active);
}

/// Render a duration rounded to milliseconds, e.g. `1h2m3.5s`, `250ms`, `0s`.
pub fn format_duration(d: Duration) -> String {
    let ms = d.num_milliseconds().max(0);
    if ms == 0 {
        return "0s".to_string();
    }
    if ms < 1000 {
        return format!("{}ms", ms);
    }
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) as f64 / 1000.0;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&format!("{}s", seconds));
    out
}

fn step_mut<'a>(
    result: &'a mut ExecutionResult,
    reference: &str,
) -> Option<&'a mut crate::model::StepResult> {
    if reference == INIT_STEP_REF {
        return Some(&mut result.initialization);
    }
    result.steps.get_mut(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepResult;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn running_result() -> ExecutionResult {
        let mut result = ExecutionResult {
            queued_at: Some(t(0)),
            ..Default::default()
        };
        result
            .steps
            .insert("a".into(), StepResult::with_status(StepStatus::Running));
        result
    }

    #[test]
    fn test_pause_round_trip_accounting() {
        let mut result = running_result();
        assert!(pause_start(&mut result, "a", t(10)));
        assert_eq!(result.steps["a"].status, Some(StepStatus::Paused));
        assert!(pause_end(&mut result, "a", t(25)));
        assert_eq!(result.steps["a"].status, Some(StepStatus::Running));

        result.finished_at = Some(t(100));
        recompute_duration(&mut result, t(0));

        assert_eq!(result.paused_ms, 15_000);
        assert_eq!(result.total_duration_ms, 100_000);
        assert_eq!(result.duration_ms, 85_000);
        assert_eq!(result.duration, "1m25s");
        assert_eq!(result.total_duration, "1m40s");
    }

    #[test]
    fn test_pause_inside_open_interval_is_noop() {
        let mut result = running_result();
        assert!(pause_start(&mut result, "a", t(10)));
        assert!(!pause_start(&mut result, "a", t(12)));
        assert_eq!(result.pauses.len(), 1);
    }

    #[test]
    fn test_pause_end_is_idempotent() {
        let mut result = running_result();
        pause_start(&mut result, "a", t(10));
        assert!(pause_end(&mut result, "a", t(20)));
        assert!(!pause_end(&mut result, "a", t(20)));
        assert_eq!(result.pauses[0].resumed_at, Some(t(20)));
    }

    #[test]
    fn test_pause_end_without_interval_is_noop() {
        let mut result = running_result();
        assert!(!pause_end(&mut result, "a", t(20)));
        assert!(result.pauses.is_empty());
        assert_eq!(result.steps["a"].status, Some(StepStatus::Running));
    }

    #[test]
    fn test_open_interval_uses_finish_time() {
        let mut result = running_result();
        pause_start(&mut result, "a", t(40));
        result.finished_at = Some(t(50));
        recompute_duration(&mut result, t(0));
        assert_eq!(result.paused_ms, 10_000);
        assert_eq!(result.duration_ms, 40_000);
    }

    #[test]
    fn test_overlapping_pauses_counted_once() {
        let mut result = running_result();
        result
            .steps
            .insert("b".into(), StepResult::with_status(StepStatus::Running));
        pause_start(&mut result, "a", t(10));
        pause_start(&mut result, "b", t(15));
        pause_end(&mut result, "a", t(20));
        pause_end(&mut result, "b", t(30));
        result.finished_at = Some(t(60));
        recompute_duration(&mut result, t(0));
        assert_eq!(result.paused_ms, 20_000);
    }

    #[test]
    fn test_heal_missing_pause_statuses() {
        let mut result = running_result();
        result.pauses.push(PauseInterval {
            reference: "a".into(),
            paused_at: t(5),
            resumed_at: None,
        });
        heal_missing_pause_statuses(&mut result);
        assert_eq!(result.steps["a"].status, Some(StepStatus::Paused));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::zero()), "0s");
        assert_eq!(format_duration(Duration::milliseconds(250)), "250ms");
        assert_eq!(format_duration(Duration::milliseconds(1500)), "1.5s");
        assert_eq!(format_duration(Duration::milliseconds(3_723_500)), "1h2m3.5s");
    }
}
