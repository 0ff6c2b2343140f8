//! Server configuration.

use serde::Deserialize;

/// Which persistence backend serves the execution store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Postgres => write!(f, "postgres"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Settings read from `TESTFLOW_*` environment variables:
/// - `TESTFLOW_HOST` (default "0.0.0.0") and `TESTFLOW_PORT` (default 8088)
/// - `TESTFLOW_STORE_BACKEND`: `postgres` or `memory`
/// - `TESTFLOW_REPORT_RETRY_LIMIT`: attempts for a report that loses a status race
/// - `TESTFLOW_SERVER_NAME`
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,

    #[serde(default = "default_report_retry_limit")]
    pub report_retry_limit: u32,

    #[serde(default = "default_server_name")]
    pub server_name: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8088
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Postgres
}

fn default_report_retry_limit() -> u32 {
    5
}

fn default_server_name() -> String {
    "testflow-control-plane".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("TESTFLOW_").from_env::<AppConfig>()
    }

    /// Address suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            store_backend: default_store_backend(),
            report_retry_limit: default_report_retry_limit(),
            server_name: default_server_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8088);
        assert_eq!(config.store_backend, StoreBackend::Postgres);
        assert_eq!(config.report_retry_limit, 5);
        assert_eq!(config.bind_address(), "0.0.0.0:8088");
    }

    #[test]
    fn test_from_prefixed_vars() {
        let vars = vec![
            ("TESTFLOW_PORT".to_string(), "9000".to_string()),
            ("TESTFLOW_STORE_BACKEND".to_string(), "memory".to_string()),
        ];
        let config: AppConfig = envy::prefixed("TESTFLOW_").from_iter(vars).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let vars = vec![("TESTFLOW_STORE_BACKEND".to_string(), "mongo".to_string())];
        let result: Result<AppConfig, _> = envy::prefixed("TESTFLOW_").from_iter(vars);
        assert!(result.is_err());
    }
}
