//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// "ok" or "unhealthy"
    pub status: String,
}

/// Detailed health report for `/api/health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiHealthResponse {
    pub status: String,

    /// Configured backend name
    pub store_backend: String,

    /// "connected" or "disconnected"
    pub store: String,

    pub uptime_seconds: u64,

    pub version: String,
}

/// `GET /health`
///
/// Liveness only; answers without touching the store.
pub async fn health_check() -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "ok".to_string(),
    })
}

/// `GET /api/health`
///
/// `503 Service Unavailable` when the execution store does not answer.
pub async fn api_health(State(state): State<AppState>) -> (StatusCode, Json<ApiHealthResponse>) {
    let store_ok = state.store_reachable().await;

    let (status_code, status) = if store_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = ApiHealthResponse {
        status: status.to_string(),
        store_backend: state.config.store_backend.to_string(),
        store: if store_ok { "connected" } else { "disconnected" }.to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::memory_state;

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await;
        assert_eq!(response.status, "ok");
    }

    #[tokio::test]
    async fn test_api_health_with_memory_store() {
        let (code, Json(body)) = api_health(State(memory_state())).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.store, "connected");
        assert_eq!(body.store_backend, "memory");
    }
}
