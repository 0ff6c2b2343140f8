//! Testflow Control Plane Server
//!
//! Serves the scheduling, lifecycle and report endpoints over one execution
//! store chosen at startup.

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use testflow_control_plane::{
    config::{AppConfig, DatabaseConfig},
    handlers,
    scheduling::{open_store, SchedulingServices},
    services::{ExecutionService, ResultIngestor, StatusListeners, TracingStatusListener},
    state::AppState,
};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,testflow_control_plane=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::api_health))
        .with_state(state.clone());

    // Producer and operator routes
    let execution_routes = Router::new()
        .route("/api/executions", post(handlers::executions::submit))
        .route(
            "/api/executions/pending/{kind}",
            get(handlers::executions::pending),
        )
        .route(
            "/api/executions/{execution_id}",
            get(handlers::executions::get),
        )
        .route(
            "/api/executions/{execution_id}/{command}",
            post(handlers::executions::command),
        )
        .route(
            "/api/runners/{runner_id}/schedule",
            post(handlers::runners::schedule),
        )
        .with_state(state.executions.clone());

    // Runner report routes
    let report_routes = Router::new()
        .route(
            "/api/executions/{execution_id}/steps",
            post(handlers::reports::step),
        )
        .route(
            "/api/executions/{execution_id}/pauses",
            post(handlers::reports::pause),
        )
        .route(
            "/api/executions/{execution_id}/resumes",
            post(handlers::reports::resume),
        )
        .route(
            "/api/executions/{execution_id}/finish",
            post(handlers::reports::finish),
        )
        .route(
            "/api/executions/{execution_id}/fatal",
            post(handlers::reports::fatal),
        )
        .with_state(state.ingestor.clone());

    Router::new()
        .merge(health_routes)
        .merge(execution_routes)
        .merge(report_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let app_config = AppConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load app config, using defaults");
        AppConfig::default()
    });

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %app_config.server_name,
        "Starting Testflow Control Plane"
    );

    let db_config = DatabaseConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load database config, using defaults");
        DatabaseConfig::default()
    });

    tracing::info!(
        host = %app_config.host,
        port = app_config.port,
        store_backend = %app_config.store_backend,
        report_retry_limit = app_config.report_retry_limit,
        "Configuration loaded"
    );

    let store = open_store(app_config.store_backend, &db_config).await?;
    let listeners = StatusListeners::new().with(Arc::new(TracingStatusListener));

    let scheduling = SchedulingServices::new(store.clone());
    let ingestor = ResultIngestor::new(store, listeners.clone(), app_config.report_retry_limit);
    let executions = ExecutionService::new(scheduling, listeners);

    let addr: SocketAddr = app_config.bind_address().parse()?;
    let state = AppState::new(app_config, executions, ingestor);
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM. A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
