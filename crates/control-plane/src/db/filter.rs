//! Typed query filters over execution documents.
//!
//! A filter is evaluated in process by the memory backend and compiled to SQL
//! by the Postgres backend; both must agree on every operator.

use crate::model::{Execution, ExecutionStatus};

use super::store::{StoreError, StoreResult};

/// Queryable fields of an execution document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    RunnerId,
    Status,
    PredictedStatus,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::RunnerId => "runner_id",
            Field::Status => "result.status",
            Field::PredictedStatus => "result.predicted_status",
        }
    }

    fn is_status(&self) -> bool {
        matches!(self, Field::Status | Field::PredictedStatus)
    }

    /// Current value of the field; `None` when missing.
    pub fn value<'a>(&self, execution: &'a Execution) -> Option<&'a str> {
        match self {
            Field::Id => Some(execution.id.as_str()),
            Field::RunnerId => execution.runner_id.as_deref(),
            Field::Status => execution.result.status.map(|s| s.as_str()),
            Field::PredictedStatus => execution.result.predicted_status.map(|s| s.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(Field, String),
    In(Field, Vec<String>),
    /// Field absent, null or the empty string.
    MissingOrEmpty(Field),
    Not(Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn id(id: impl Into<String>) -> Self {
        Filter::Eq(Field::Id, id.into())
    }

    pub fn runner(runner_id: impl Into<String>) -> Self {
        Filter::Eq(Field::RunnerId, runner_id.into())
    }

    pub fn status(status: ExecutionStatus) -> Self {
        Filter::Eq(Field::Status, status.as_str().to_string())
    }

    pub fn status_in(statuses: &[ExecutionStatus]) -> Self {
        Filter::In(
            Field::Status,
            statuses.iter().map(|s| s.as_str().to_string()).collect(),
        )
    }

    pub fn predicted(status: ExecutionStatus) -> Self {
        Filter::Eq(Field::PredictedStatus, status.as_str().to_string())
    }

    /// Status is one of `statuses`, or was never set.
    pub fn status_in_or_missing(statuses: &[ExecutionStatus]) -> Self {
        Filter::Or(vec![
            Filter::status_in(statuses),
            Filter::MissingOrEmpty(Field::Status),
        ])
    }

    /// Conjunction that flattens nested `And`s.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    /// Reject filters that no backend could execute meaningfully.
    pub fn validate(&self) -> StoreResult<()> {
        match self {
            Filter::Eq(field, value) => validate_value(*field, value),
            Filter::In(field, values) => {
                if values.is_empty() {
                    return Err(StoreError::InvalidFilter(format!(
                        "empty value list for {}",
                        field.as_str()
                    )));
                }
                values.iter().try_for_each(|v| validate_value(*field, v))
            }
            Filter::MissingOrEmpty(_) => Ok(()),
            Filter::Not(inner) => inner.validate(),
            Filter::And(filters) | Filter::Or(filters) => {
                if filters.is_empty() {
                    return Err(StoreError::InvalidFilter(
                        "empty conjunction or disjunction".to_string(),
                    ));
                }
                filters.iter().try_for_each(Filter::validate)
            }
        }
    }

    pub fn matches(&self, execution: &Execution) -> bool {
        match self {
            Filter::Eq(field, value) => field.value(execution) == Some(value.as_str()),
            Filter::In(field, values) => field
                .value(execution)
                .map(|v| values.iter().any(|candidate| candidate == v))
                .unwrap_or(false),
            Filter::MissingOrEmpty(field) => field.value(execution).map_or(true, str::is_empty),
            Filter::Not(inner) => !inner.matches(execution),
            Filter::And(filters) => filters.iter().all(|f| f.matches(execution)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(execution)),
        }
    }
}

impl std::ops::Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }
}

fn validate_value(field: Field, value: &str) -> StoreResult<()> {
    if field.is_status() && ExecutionStatus::parse(value).is_none() {
        return Err(StoreError::InvalidFilter(format!(
            "unknown status '{}' for {}",
            value,
            field.as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn execution(status: Option<ExecutionStatus>, runner: Option<&str>) -> Execution {
        let mut e = Execution::queued("e1", Utc::now());
        e.result.status = status;
        e.runner_id = runner.map(str::to_string);
        e
    }

    #[test]
    fn test_missing_or_empty() {
        let filter = Filter::MissingOrEmpty(Field::RunnerId);
        assert!(filter.matches(&execution(None, None)));
        assert!(filter.matches(&execution(None, Some(""))));
        assert!(!filter.matches(&execution(None, Some("r1"))));
    }

    #[test]
    fn test_status_in_or_missing() {
        let filter = Filter::status_in_or_missing(&[ExecutionStatus::Queued]);
        assert!(filter.matches(&execution(None, None)));
        assert!(filter.matches(&execution(Some(ExecutionStatus::Queued), None)));
        assert!(!filter.matches(&execution(Some(ExecutionStatus::Running), None)));
    }

    #[test]
    fn test_not_and_combinators() {
        let filter = Filter::status(ExecutionStatus::Stopping)
            .and(!Filter::predicted(ExecutionStatus::Canceled));
        let mut e = execution(Some(ExecutionStatus::Stopping), None);
        e.result.predicted_status = Some(ExecutionStatus::Aborted);
        assert!(filter.matches(&e));
        e.result.predicted_status = Some(ExecutionStatus::Canceled);
        assert!(!filter.matches(&e));
    }

    #[test]
    fn test_and_flattens() {
        let filter = Filter::id("a").and(Filter::runner("r")).and(Filter::status(ExecutionStatus::Queued));
        match filter {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected filter {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_malformed_filters() {
        assert!(matches!(
            Filter::In(Field::Status, vec![]).validate(),
            Err(StoreError::InvalidFilter(_))
        ));
        assert!(matches!(
            Filter::Eq(Field::Status, "sleeping".into()).validate(),
            Err(StoreError::InvalidFilter(_))
        ));
        assert!(matches!(
            Filter::Or(vec![]).validate(),
            Err(StoreError::InvalidFilter(_))
        ));
        assert!(Filter::status_in_or_missing(&ExecutionStatus::non_terminal())
            .validate()
            .is_ok());
        assert!(Filter::runner("anything").validate().is_ok());
    }
}
