//! Order server configuration

use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which [`OrderStore`](crate::db::OrderStore) implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Order server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    pub http_host: String,
    pub http_port: u16,
    pub store_backend: StoreBackend,
    /// PostgreSQL connection URL (required for the postgres backend)
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Settlement chain base URL
    pub chain_endpoint: String,
    /// Product catalog base URL
    pub catalog_endpoint: String,
    /// Picture service base URL
    pub picture_endpoint: String,
    /// Answer confirm/cancel requests locally instead of calling the chain
    pub test_mode: bool,
    /// Upper bound for a listing's duration
    pub max_duration_secs: i64,
    /// HS256 secret for user bearer tokens
    pub jwt_secret: String,
    /// Shared secret expected in `X-Chain-Secret` on chain and ops routes
    pub chain_callback_secret: Option<String>,
    pub request_timeout: Duration,
    /// Per-attempt timeout of outbound calls
    pub notify_timeout: Duration,
    pub notify_max_attempts: u32,
    pub notify_retry_base: Duration,
    pub expiry_scan_interval: Duration,
    pub log_json: bool,
    /// Daily rolling log files are written here when set
    pub log_dir: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BoxError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let parsed = |name: &str| -> Result<Option<u64>, BoxError> {
            match var(name) {
                Some(v) => v
                    .parse()
                    .map(Some)
                    .map_err(|_| format!("{name} must be a non-negative integer, got {v:?}").into()),
                None => Ok(None),
            }
        };
        let flag = |name: &str| {
            var(name).is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        };

        let environment = var("ENVIRONMENT").unwrap_or_else(|| "development".into());

        let store_backend = match var("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(format!("STORE_BACKEND must be postgres or memory, got {other:?}").into());
            }
        };
        let database_url = var("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err("DATABASE_URL must be set".into());
        }

        let http_port = match parsed("HTTP_PORT")? {
            Some(p) => u16::try_from(p).map_err(|_| format!("HTTP_PORT out of range: {p}"))?,
            None => 8080,
        };

        Ok(Self {
            http_host: var("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            http_port,
            store_backend,
            database_url,
            db_max_connections: parsed("DB_MAX_CONNECTIONS")?.unwrap_or(10) as u32,
            chain_endpoint: var("CHAIN_ENDPOINT").unwrap_or_else(|| "http://127.0.0.1:7050".into()),
            catalog_endpoint: var("CATALOG_ENDPOINT")
                .unwrap_or_else(|| "http://127.0.0.1:8081".into()),
            picture_endpoint: var("PICTURE_ENDPOINT")
                .unwrap_or_else(|| "http://127.0.0.1:8082".into()),
            test_mode: flag("TEST_MODE"),
            max_duration_secs: parsed("MAX_DURATION_SECS")?.unwrap_or(30) as i64,
            jwt_secret: require_secret(&lookup, "JWT_SECRET", &environment)?,
            chain_callback_secret: var("CHAIN_CALLBACK_SECRET"),
            request_timeout: Duration::from_secs(parsed("REQUEST_TIMEOUT_SECS")?.unwrap_or(30)),
            notify_timeout: Duration::from_millis(parsed("NOTIFY_TIMEOUT_MS")?.unwrap_or(3_000)),
            notify_max_attempts: parsed("NOTIFY_MAX_ATTEMPTS")?.unwrap_or(3) as u32,
            notify_retry_base: Duration::from_millis(parsed("NOTIFY_RETRY_BASE_MS")?.unwrap_or(200)),
            expiry_scan_interval: Duration::from_secs(
                parsed("EXPIRY_SCAN_INTERVAL_SECS")?.unwrap_or(1).max(1),
            ),
            log_json: flag("LOG_JSON"),
            log_dir: var("LOG_DIR"),
            environment,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

/// Require a secret env var: must be set and non-empty in non-development environments.
fn require_secret<F>(lookup: &F, name: &str, environment: &str) -> Result<String, BoxError>
where
    F: Fn(&str) -> Option<String>,
{
    let val = match lookup(name) {
        Some(v) => v,
        None => {
            if environment != "development" {
                return Err(format!("{name} must be set in {environment} environment").into());
            }
            format!("dev-{name}-not-for-production")
        }
    };
    if val.is_empty() && environment != "development" {
        return Err(format!("{name} must not be empty in {environment} environment").into());
    }
    Ok(val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, BoxError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_memory_backend_defaults() {
        let config = load(&[("STORE_BACKEND", "memory")]).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.environment, "development");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.max_duration_secs, 30);
        assert_eq!(config.notify_max_attempts, 3);
        assert!(!config.test_mode);
        assert!(config.chain_callback_secret.is_none());
        assert_eq!(config.jwt_secret, "dev-JWT_SECRET-not-for-production");
    }

    #[test]
    fn test_postgres_requires_database_url() {
        assert!(load(&[]).is_err());
        let config = load(&[("DATABASE_URL", "postgres://localhost/orders")]).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Postgres);
    }

    #[test]
    fn test_production_requires_jwt_secret() {
        let err = load(&[("STORE_BACKEND", "memory"), ("ENVIRONMENT", "production")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));

        let config = load(&[
            ("STORE_BACKEND", "memory"),
            ("ENVIRONMENT", "production"),
            ("JWT_SECRET", "s3cret"),
        ])
        .unwrap();
        assert_eq!(config.jwt_secret, "s3cret");
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = load(&[
            ("STORE_BACKEND", "memory"),
            ("TEST_MODE", "true"),
            ("MAX_DURATION_SECS", "120"),
            ("HTTP_PORT", "9000"),
            ("CHAIN_CALLBACK_SECRET", "chain-key"),
        ])
        .unwrap();
        assert!(config.test_mode);
        assert_eq!(config.max_duration_secs, 120);
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
        assert_eq!(config.chain_callback_secret.as_deref(), Some("chain-key"));

        assert!(load(&[("STORE_BACKEND", "memory"), ("HTTP_PORT", "70000")]).is_err());
        assert!(load(&[("STORE_BACKEND", "redis")]).is_err());
        assert!(load(&[("STORE_BACKEND", "memory"), ("NOTIFY_TIMEOUT_MS", "soon")]).is_err());
    }
}
