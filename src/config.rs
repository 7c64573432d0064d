//! Application configuration module
//!
//! Provides centralized, environment-aware configuration with validation.

use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Timeouts for each class of upstream catalog request (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct UpstreamTimeouts {
    pub primary: Duration,
    pub fallback: Duration,
    pub lookup: Duration,
}

impl Default for UpstreamTimeouts {
    fn default() -> Self {
        Self {
            primary: Duration::from_millis(2200),
            fallback: Duration::from_millis(1800),
            lookup: Duration::from_millis(1500),
        }
    }
}

/// Cache/index sizing constants for the Smart Search Engine and Reranker (§3, §4.3).
#[derive(Debug, Clone, Copy)]
pub struct SearchTuning {
    pub fresh_ttl: Duration,
    pub stale_ttl: Duration,
    pub local_index_cap: usize,
    pub local_index_search_cap: usize,
    pub profile_cache_cap: u64,
    pub profile_cache_ttl: Duration,
    pub max_smart_results: usize,
    pub smart_min_results: usize,
    pub smart_max_latency: Duration,
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            fresh_ttl: Duration::from_secs(120),
            stale_ttl: Duration::from_secs(20 * 60),
            local_index_cap: 6000,
            local_index_search_cap: 120,
            profile_cache_cap: 300,
            profile_cache_ttl: Duration::from_secs(120),
            max_smart_results: 40,
            smart_min_results: 8,
            smart_max_latency: Duration::from_millis(3200),
        }
    }
}

/// Keep-alive self-ping configuration (§6, §9).
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    pub url: Option<String>,
    pub interval: Duration,
    pub timeout: Duration,
}

impl KeepaliveConfig {
    const MIN_INTERVAL: Duration = Duration::from_secs(60);
    const MIN_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("KEEPALIVE_URL").ok().filter(|s| !s.is_empty());

        let interval_ms: u64 = std::env::var("KEEPALIVE_INTERVAL_MS")
            .ok()
            .map(|v| {
                v.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "KEEPALIVE_INTERVAL_MS".to_string(),
                    message: "must be an integer".to_string(),
                })
            })
            .transpose()?
            .unwrap_or(240_000);

        let timeout_ms: u64 = std::env::var("KEEPALIVE_TIMEOUT_MS")
            .ok()
            .map(|v| {
                v.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "KEEPALIVE_TIMEOUT_MS".to_string(),
                    message: "must be an integer".to_string(),
                })
            })
            .transpose()?
            .unwrap_or(10_000);

        let interval = Duration::from_millis(interval_ms);
        let timeout = Duration::from_millis(timeout_ms);

        if interval < Self::MIN_INTERVAL {
            return Err(ConfigError::InvalidValue {
                key: "KEEPALIVE_INTERVAL_MS".to_string(),
                message: "must be at least 60000ms".to_string(),
            });
        }
        if timeout < Self::MIN_TIMEOUT {
            return Err(ConfigError::InvalidValue {
                key: "KEEPALIVE_TIMEOUT_MS".to_string(),
                message: "must be at least 1000ms".to_string(),
            });
        }

        Ok(Self { url, interval, timeout })
    }
}

/// Identity provider settings for bearer-token verification (§6). Verification of the
/// token itself is an external collaborator; this only carries the connection details
/// a real `TokenVerifier` implementation would need.
#[derive(Debug, Clone)]
pub struct FirebaseSettings {
    pub service_account: Option<String>,
    pub database_url: Option<String>,
}

impl FirebaseSettings {
    pub fn from_env() -> Self {
        Self {
            service_account: std::env::var("FIREBASE_SERVICE_ACCOUNT").ok(),
            database_url: std::env::var("FIREBASE_DATABASE_URL").ok(),
        }
    }
}

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env(_env: Environment) -> Result<Self, ConfigError> {
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            request_timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Complete application configuration
#[derive(Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub firebase: FirebaseSettings,
    pub keepalive: KeepaliveConfig,
    pub upstream_timeouts: UpstreamTimeouts,
    pub search_tuning: SearchTuning,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();

        Ok(Self {
            environment,
            server: ServerConfig::from_env(environment)?,
            firebase: FirebaseSettings::from_env(),
            keepalive: KeepaliveConfig::from_env()?,
            upstream_timeouts: UpstreamTimeouts::default(),
            search_tuning: SearchTuning::default(),
        })
    }
}

/// Helper function to get a required environment variable
pub fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingRequired(key.to_string()))
}

/// Helper function to get an optional environment variable with a default
pub fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection() {
        assert!(Environment::from_env().is_development());
    }

    #[test]
    fn test_keepalive_rejects_short_interval() {
        std::env::set_var("KEEPALIVE_INTERVAL_MS", "1000");
        let result = KeepaliveConfig::from_env();
        assert!(result.is_err());
        std::env::remove_var("KEEPALIVE_INTERVAL_MS");
    }

    #[test]
    fn test_keepalive_defaults() {
        std::env::remove_var("KEEPALIVE_URL");
        std::env::remove_var("KEEPALIVE_INTERVAL_MS");
        std::env::remove_var("KEEPALIVE_TIMEOUT_MS");
        let cfg = KeepaliveConfig::from_env().unwrap();
        assert!(cfg.url.is_none());
        assert_eq!(cfg.interval, Duration::from_millis(240_000));
    }
}
