//! Execution submission, lookup and lifecycle commands.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::{Execution, NewExecution};
use crate::scheduling::PendingKind;
use crate::services::{ControlCommand, ExecutionService};

/// Outcome of a lifecycle command. `applied` is false when the execution was
/// not in a state the command accepts; nothing was changed in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub execution_id: String,
    pub command: ControlCommand,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
}

/// Submit an execution.
///
/// POST /api/executions
pub async fn submit(
    State(service): State<ExecutionService>,
    Json(request): Json<NewExecution>,
) -> Result<(StatusCode, Json<Execution>), AppError> {
    let execution = service.submit(request).await?;
    Ok((StatusCode::CREATED, Json(execution)))
}

/// GET /api/executions/{execution_id}
pub async fn get(
    State(service): State<ExecutionService>,
    Path(execution_id): Path<String>,
) -> Result<Json<Execution>, AppError> {
    Ok(Json(service.get(&execution_id).await?))
}

/// Run a lifecycle command.
///
/// POST /api/executions/{execution_id}/{command}
pub async fn command(
    State(service): State<ExecutionService>,
    Path((execution_id, command)): Path<(String, String)>,
) -> Result<Json<CommandResponse>, AppError> {
    let command = ControlCommand::parse(&command)
        .ok_or_else(|| AppError::Validation(format!("unknown command '{}'", command)))?;

    let execution = service.command(&execution_id, command).await?;
    if execution.is_none() {
        tracing::debug!(execution_id = %execution_id, ?command, "Command guard did not match");
    }

    Ok(Json(CommandResponse {
        execution_id,
        command,
        applied: execution.is_some(),
        execution,
    }))
}

/// Executions awaiting a runner-side action.
///
/// GET /api/executions/pending/{kind}
pub async fn pending(
    State(service): State<ExecutionService>,
    Path(kind): Path<PendingKind>,
) -> Result<Json<Vec<Execution>>, AppError> {
    Ok(Json(service.pending(kind).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryExecutionStore;
    use crate::model::ExecutionStatus;
    use crate::scheduling::SchedulingServices;
    use crate::services::StatusListeners;
    use std::sync::Arc;

    fn service() -> ExecutionService {
        ExecutionService::new(
            SchedulingServices::new(Arc::new(MemoryExecutionStore::new())),
            StatusListeners::new(),
        )
    }

    async fn submitted(service: &ExecutionService, id: &str) {
        submit(
            State(service.clone()),
            Json(NewExecution {
                id: Some(id.into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_submit_returns_created() {
        let (code, Json(execution)) = submit(State(service()), Json(NewExecution::default()))
            .await
            .unwrap();
        assert_eq!(code, StatusCode::CREATED);
        assert_eq!(execution.status(), ExecutionStatus::Queued);
    }

    #[tokio::test]
    async fn test_cancel_queued_execution() {
        let service = service();
        submitted(&service, "e1").await;

        let Json(response) = command(State(service.clone()), Path(("e1".into(), "cancel".into())))
            .await
            .unwrap();
        assert!(response.applied);
        assert_eq!(
            response.execution.unwrap().status(),
            ExecutionStatus::Canceled
        );

        let Json(again) = command(State(service), Path(("e1".into(), "cancel".into())))
            .await
            .unwrap();
        assert!(!again.applied);
        assert!(again.execution.is_none());
    }

    #[tokio::test]
    async fn test_unknown_command_is_rejected() {
        let service = service();
        submitted(&service, "e1").await;
        let result = command(State(service), Path(("e1".into(), "explode".into()))).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_pending_lists_cancelling() {
        let service = service();
        submitted(&service, "e1").await;
        service
            .schedule(&crate::model::Runner::new("r1"))
            .await
            .unwrap();
        service.command("e1", ControlCommand::Start).await.unwrap();
        service.command("e1", ControlCommand::Cancel).await.unwrap();

        let Json(pending) = pending(State(service), Path(PendingKind::Cancelling))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status(), ExecutionStatus::Stopping);
    }

    #[test]
    fn test_command_response_serialization() {
        let response = CommandResponse {
            execution_id: "e1".into(),
            command: ControlCommand::ForceCancel,
            applied: false,
            execution: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"force-cancel\""));
        assert!(!json.contains("\"execution\""));
    }
}
