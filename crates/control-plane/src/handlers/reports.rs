//! Runner progress reports.
//!
//! Timestamps are optional in every body and default to the time the report
//! is received.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::model::{Execution, StepReport};
use crate::services::ResultIngestor;

#[derive(Debug, Clone, Deserialize)]
pub struct PauseRequest {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinishRequest {
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FatalRequest {
    pub message: String,
    /// Ends the execution as `aborted` instead of `failed`.
    #[serde(default)]
    pub aborted: bool,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

/// POST /api/executions/{execution_id}/steps
pub async fn step(
    State(ingestor): State<ResultIngestor>,
    Path(execution_id): Path<String>,
    Json(report): Json<StepReport>,
) -> Result<Json<Execution>, AppError> {
    if report.reference.trim().is_empty() {
        return Err(AppError::Validation("step report needs a ref".to_string()));
    }
    Ok(Json(ingestor.report_step(&execution_id, report).await?))
}

/// POST /api/executions/{execution_id}/pauses
pub async fn pause(
    State(ingestor): State<ResultIngestor>,
    Path(execution_id): Path<String>,
    Json(request): Json<PauseRequest>,
) -> Result<Json<Execution>, AppError> {
    let at = request.at.unwrap_or_else(Utc::now);
    Ok(Json(ingestor.pause(&execution_id, &request.reference, at).await?))
}

/// POST /api/executions/{execution_id}/resumes
pub async fn resume(
    State(ingestor): State<ResultIngestor>,
    Path(execution_id): Path<String>,
    Json(request): Json<PauseRequest>,
) -> Result<Json<Execution>, AppError> {
    let at = request.at.unwrap_or_else(Utc::now);
    Ok(Json(ingestor.resume(&execution_id, &request.reference, at).await?))
}

/// POST /api/executions/{execution_id}/finish
pub async fn finish(
    State(ingestor): State<ResultIngestor>,
    Path(execution_id): Path<String>,
    Json(request): Json<FinishRequest>,
) -> Result<Json<Execution>, AppError> {
    let at = request.at.unwrap_or_else(Utc::now);
    Ok(Json(ingestor.finish(&execution_id, at).await?))
}

/// POST /api/executions/{execution_id}/fatal
pub async fn fatal(
    State(ingestor): State<ResultIngestor>,
    Path(execution_id): Path<String>,
    Json(request): Json<FatalRequest>,
) -> Result<Json<Execution>, AppError> {
    let at = request.at.unwrap_or_else(Utc::now);
    let execution = ingestor
        .fatal(&execution_id, &request.message, request.aborted, at)
        .await?;
    Ok(Json(execution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecutionStatus, NewExecution, Signature, StepStatus};
    use crate::state::tests::memory_state;

    #[tokio::test]
    async fn test_step_report_then_finish() {
        let state = memory_state();
        state
            .executions
            .submit(NewExecution {
                id: Some("e1".into()),
                signature: vec![Signature::leaf("a")],
                ..Default::default()
            })
            .await
            .unwrap();

        let report: StepReport = serde_json::from_value(serde_json::json!({
            "ref": "a",
            "status": "passed",
            "started_at": "2024-01-01T00:00:00Z",
            "finished_at": "2024-01-01T00:00:05Z"
        }))
        .unwrap();
        let Json(execution) = step(State(state.ingestor.clone()), Path("e1".into()), Json(report))
            .await
            .unwrap();
        assert_eq!(
            execution.result.step("a").and_then(|s| s.status),
            Some(StepStatus::Passed)
        );

        let Json(execution) = finish(
            State(state.ingestor.clone()),
            Path("e1".into()),
            Json(FinishRequest::default()),
        )
        .await
        .unwrap();
        assert_eq!(execution.status(), ExecutionStatus::Passed);
    }

    #[tokio::test]
    async fn test_blank_ref_is_rejected() {
        let state = memory_state();
        let result = step(
            State(state.ingestor),
            Path("e1".into()),
            Json(StepReport::default()),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_fatal_on_missing_execution_is_not_found() {
        let state = memory_state();
        let request = FatalRequest {
            message: "runner lost".into(),
            aborted: false,
            at: None,
        };
        let result = fatal(State(state.ingestor), Path("missing".into()), Json(request)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
