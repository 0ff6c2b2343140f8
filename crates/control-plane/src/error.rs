//! Service-level errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Persistence failure, tagged with what was being attempted on which execution.
    #[error("{operation} failed for execution '{execution_id}': {source}")]
    Store {
        operation: &'static str,
        execution_id: String,
        #[source]
        source: StoreError,
    },

    #[error("{operation} query failed: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Lost a race against a concurrent writer, or a duplicate id.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn store(operation: &'static str, execution_id: impl Into<String>, source: StoreError) -> Self {
        AppError::Store {
            operation,
            execution_id: execution_id.into(),
            source,
        }
    }

    pub fn query(operation: &'static str, source: StoreError) -> Self {
        AppError::Query { operation, source }
    }

    fn store_status(&self, source: &StoreError) -> StatusCode {
        match source {
            StoreError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            _ => {
                tracing::error!(error = %self, "Store error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Store { source, .. } | AppError::Query { source, .. } => {
                self.store_status(source)
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Config(msg) => {
                tracing::error!(error = %msg, "Configuration error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Serialization(e) => {
                tracing::error!(error = %e, "Serialization error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<envy::Error> for AppError {
    fn from(err: envy::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_carries_context() {
        let err = AppError::store(
            "abort",
            "exec-1",
            StoreError::InvalidFilter("empty value list".into()),
        );
        assert_eq!(
            err.to_string(),
            "abort failed for execution 'exec-1': Invalid filter: empty value list"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_status_codes() {
        let conflict = AppError::Conflict("status changed".into()).into_response();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let missing = AppError::NotFound("execution 'x'".into()).into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let bad_filter =
            AppError::store("query", "", StoreError::InvalidFilter("x".into())).into_response();
        assert_eq!(bad_filter.status(), StatusCode::BAD_REQUEST);
    }
}
