//! Resolver and store configuration.
//!
//! Configuration is loaded from environment variables with defaults suitable
//! for local development.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Deadlines applied to every store call made by the resolver and grant manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Upper bound for a single `rules_for` read.
    pub query_timeout: Duration,

    /// Deadline handed to the store for a single write transaction.
    ///
    /// The store enforces it up to its commit point and never abandons a commit.
    pub write_timeout: Duration,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_millis(250),
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl RulesConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RULES_QUERY_TIMEOUT_MS`: Read deadline in milliseconds (default: 250)
    /// - `RULES_WRITE_TIMEOUT_MS`: Write deadline in milliseconds (default: 5000)
    ///
    /// Unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            query_timeout: env_millis("RULES_QUERY_TIMEOUT_MS").unwrap_or(default.query_timeout),
            write_timeout: env_millis("RULES_WRITE_TIMEOUT_MS").unwrap_or(default.write_timeout),
        }
    }

    /// Set the read deadline.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Set the write deadline.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// Connection settings for the PostgreSQL rule store.
#[cfg(feature = "postgres")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// PostgreSQL connection string.
    pub url: String,

    /// Maximum pool size.
    pub max_connections: u32,

    /// Connections kept open while idle.
    pub min_connections: u32,

    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
}

#[cfg(feature = "postgres")]
impl PostgresConfig {
    /// Create a configuration for `url` with default pool settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 25,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(3),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RULES_DATABASE_URL`: Connection string, falling back to `DATABASE_URL` (required)
    /// - `RULES_DB_MAX_CONNECTIONS`: Maximum pool size (default: 25)
    /// - `RULES_DB_MIN_CONNECTIONS`: Idle pool size (default: 5)
    /// - `RULES_DB_ACQUIRE_TIMEOUT_MS`: Pool acquire timeout (default: 3000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("RULES_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| ConfigError::MissingEnvVar("RULES_DATABASE_URL".to_string()))?;

        let default = Self::new(url);
        let max_connections =
            env_parse("RULES_DB_MAX_CONNECTIONS")?.unwrap_or(default.max_connections);
        let min_connections =
            env_parse("RULES_DB_MIN_CONNECTIONS")?.unwrap_or(default.min_connections);
        let acquire_timeout =
            env_millis("RULES_DB_ACQUIRE_TIMEOUT_MS").unwrap_or(default.acquire_timeout);

        if min_connections > max_connections {
            return Err(ConfigError::InvalidValue {
                key: "RULES_DB_MIN_CONNECTIONS".to_string(),
                message: format!("must not exceed max connections ({})", max_connections),
            });
        }

        Ok(Self {
            max_connections,
            min_connections,
            acquire_timeout,
            ..default
        })
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
}

#[cfg(feature = "postgres")]
fn env_parse(key: &str) -> Result<Option<u32>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an unsigned integer, got {:?}", raw),
        }),
        Err(_) => Ok(None),
    }
}
