use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub queue: QueueSettings,
    pub sessions: SessionsConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Command store backend: memory or redis
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Redis connection URL (required when backend = "redis")
    #[serde(default)]
    pub redis_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// Lease duration applied when a claim omits visibility_timeout_ms
    #[serde(default = "default_visibility_timeout")]
    pub default_visibility_timeout_secs: u64,

    /// Batch size applied when a claim omits limit
    #[serde(default = "default_claim_limit")]
    pub default_claim_limit: u32,

    /// Upper bound on the per-claim batch size
    #[serde(default = "default_max_claim_limit")]
    pub max_claim_limit: u32,

    /// How often the expired-claim sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Claim-hash keys examined per store scan page during a sweep
    #[serde(default = "default_sweep_page_size")]
    pub sweep_page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Session verifier: static (configured token digests) or http
    #[serde(default = "default_session_mode")]
    pub mode: String,

    /// Base URL of the session service (required when mode = "http")
    #[serde(default)]
    pub url: String,

    /// Request timeout for the session service in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub timeout_ms: u64,

    /// Device session tokens for static mode, as SHA-256 digests
    #[serde(default)]
    pub device_tokens: Vec<DeviceTokenEntry>,

    /// Customer session tokens for static mode, as SHA-256 digests
    #[serde(default)]
    pub customer_tokens: Vec<CustomerTokenEntry>,
}

/// Static device session entry. Tokens are never configured in the clear;
/// `token_sha256` holds the hex digest of the bearer token.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceTokenEntry {
    pub token_sha256: String,
    pub device_id: Uuid,
}

/// Static customer session entry, digest-keyed like [`DeviceTokenEntry`].
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerTokenEntry {
    pub token_sha256: String,
    pub customer_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Claim/extend/submit calls allowed per device per minute; 0 disables
    /// rate limiting.
    #[serde(default = "default_device_rate_limit")]
    pub device_rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_store_backend() -> String {
    "memory".to_string()
}
fn default_visibility_timeout() -> u64 {
    300
}
fn default_claim_limit() -> u32 {
    1
}
fn default_max_claim_limit() -> u32 {
    100
}
fn default_sweep_interval() -> u64 {
    10
}
fn default_sweep_page_size() -> u32 {
    100
}
fn default_session_mode() -> String {
    "static".to_string()
}
fn default_session_timeout_ms() -> u64 {
    5000
}
fn default_device_rate_limit() -> u32 {
    0
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with FLEETQ__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("FLEETQ").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// This method creates a config entirely from defaults and overrides,
    /// without relying on config files (which may not be accessible during tests).
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        // Embed defaults directly to avoid file system dependency in tests
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [store]
            backend = "memory"
            redis_url = ""

            [queue]
            default_visibility_timeout_secs = 300
            default_claim_limit = 1
            max_claim_limit = 100
            sweep_interval_secs = 10
            sweep_page_size = 100

            [sessions]
            mode = "static"
            url = ""
            timeout_ms = 5000
            device_tokens = []
            customer_tokens = []

            [security]
            cors_origins = []
            device_rate_limit_per_minute = 0

            [logging]
            level = "info"
            format = "json"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        // Skip validation in tests to allow partial configs
        Ok(cfg)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        match self.store.backend.as_str() {
            "memory" => {}
            "redis" => {
                if self.store.redis_url.is_empty() {
                    return Err(ConfigValidationError::MissingRequired(
                        "FLEETQ__STORE__REDIS_URL must be set when the store backend is redis"
                            .to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "Unknown store backend: {} (expected memory or redis)",
                    other
                )));
            }
        }

        match self.sessions.mode.as_str() {
            "static" => {}
            "http" => {
                if self.sessions.url.is_empty() {
                    return Err(ConfigValidationError::MissingRequired(
                        "FLEETQ__SESSIONS__URL must be set when the session mode is http"
                            .to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "Unknown session mode: {} (expected static or http)",
                    other
                )));
            }
        }

        if self.queue.default_claim_limit == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "default_claim_limit must be at least 1".to_string(),
            ));
        }
        if self.queue.default_claim_limit > self.queue.max_claim_limit {
            return Err(ConfigValidationError::InvalidValue(
                "default_claim_limit cannot exceed max_claim_limit".to_string(),
            ));
        }
        if self.queue.sweep_interval_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.queue.sweep_page_size == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "sweep_page_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Engine tunables derived from the `[queue]` section.
    pub fn queue_config(&self) -> queue::QueueConfig {
        queue::QueueConfig {
            default_visibility_timeout: Duration::from_secs(
                self.queue.default_visibility_timeout_secs,
            ),
            default_claim_limit: self.queue.default_claim_limit,
            sweep_page_size: self.queue.sweep_page_size,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .expect("Invalid socket address")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load_with_defaults() {
        let config = Config::load_for_test(&[]).expect("Failed to load config");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.queue.default_visibility_timeout_secs, 300);
        assert_eq!(config.queue.default_claim_limit, 1);
        assert_eq!(config.queue.max_claim_limit, 100);
        assert_eq!(config.queue.sweep_interval_secs, 10);
        assert_eq!(config.sessions.mode, "static");
        assert_eq!(config.security.device_rate_limit_per_minute, 0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_override() {
        let config = Config::load_for_test(&[
            ("server.port", "9000"),
            ("logging.level", "debug"),
            ("queue.default_claim_limit", "5"),
        ])
        .expect("Failed to load config");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.queue.default_claim_limit, 5);
    }

    #[test]
    fn test_config_validation_redis_requires_url() {
        let config =
            Config::load_for_test(&[("store.backend", "redis")]).expect("Failed to load config");

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("REDIS_URL"));
    }

    #[test]
    fn test_config_validation_unknown_backend() {
        let config =
            Config::load_for_test(&[("store.backend", "dynamo")]).expect("Failed to load config");

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("store backend"));
    }

    #[test]
    fn test_config_validation_http_sessions_require_url() {
        let config =
            Config::load_for_test(&[("sessions.mode", "http")]).expect("Failed to load config");

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("SESSIONS__URL"));
    }

    #[test]
    fn test_config_validation_claim_limits() {
        let config = Config::load_for_test(&[("queue.default_claim_limit", "0")])
            .expect("Failed to load config");
        assert!(config.validate().is_err());

        let config = Config::load_for_test(&[
            ("queue.default_claim_limit", "50"),
            ("queue.max_claim_limit", "10"),
        ])
        .expect("Failed to load config");
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("max_claim_limit"));
    }

    #[test]
    fn test_socket_addr() {
        let config = Config::load_for_test(&[("server.host", "127.0.0.1"), ("server.port", "3000")])
            .expect("Failed to load config");

        let addr = config.socket_addr();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_queue_config_mapping() {
        let config = Config::load_for_test(&[
            ("queue.default_visibility_timeout_secs", "120"),
            ("queue.sweep_page_size", "25"),
        ])
        .expect("Failed to load config");

        let queue_config = config.queue_config();
        assert_eq!(
            queue_config.default_visibility_timeout,
            Duration::from_secs(120)
        );
        assert_eq!(queue_config.default_claim_limit, 1);
        assert_eq!(queue_config.sweep_page_size, 25);
    }
}
