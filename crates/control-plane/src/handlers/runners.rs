//! Runner polling endpoint.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::{Execution, Runner};
use crate::services::ExecutionService;

/// Optional runner identity details sent alongside the poll.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerQuery {
    pub name: Option<String>,
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
}

/// Claim the next execution for a runner.
///
/// POST /api/runners/{runner_id}/schedule
///
/// `found: false` is the normal answer when nothing is waiting.
pub async fn schedule(
    State(service): State<ExecutionService>,
    Path(runner_id): Path<String>,
    Query(query): Query<RunnerQuery>,
) -> Result<Json<ScheduleResponse>, AppError> {
    let runner = Runner {
        id: runner_id,
        name: query.name.unwrap_or_default(),
        environment: query.environment.unwrap_or_default(),
    };

    let execution = service.schedule(&runner).await?;
    Ok(Json(ScheduleResponse {
        found: execution.is_some(),
        execution,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryExecutionStore;
    use crate::model::{ExecutionStatus, NewExecution};
    use crate::scheduling::SchedulingServices;
    use crate::services::StatusListeners;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_schedule_empty_then_found() {
        let service = ExecutionService::new(
            SchedulingServices::new(Arc::new(MemoryExecutionStore::new())),
            StatusListeners::new(),
        );

        let Json(empty) = schedule(
            State(service.clone()),
            Path("r1".into()),
            Query(RunnerQuery::default()),
        )
        .await
        .unwrap();
        assert!(!empty.found);

        service
            .submit(NewExecution {
                id: Some("e1".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let Json(found) = schedule(State(service), Path("r1".into()), Query(RunnerQuery::default()))
            .await
            .unwrap();
        assert!(found.found);
        let execution = found.execution.unwrap();
        assert_eq!(execution.status(), ExecutionStatus::Assigned);
        assert_eq!(execution.runner(), Some("r1"));
    }
}
