//! Configuration for quota-rs
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `QUOTA` using `__` as the section
//! separator (e.g. `QUOTA__DATABASE__URL=sqlite://quota.db`).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{QuotaError, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HMAC secret for bearer tokens
    pub jwt_secret: String,
    pub token_ttl_hours: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Config {
    /// Load configuration, reading `path` if given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.listen_addr", "0.0.0.0:8080")?
            .set_default("database.url", "sqlite://quota.db")?
            .set_default("database.max_connections", 5)?
            .set_default("auth.jwt_secret", "change-me-in-production")?
            .set_default("auth.token_ttl_hours", 24)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("QUOTA")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.listen_addr.is_empty() {
            return Err(QuotaError::Config("Listen address is required".to_string()));
        }

        if self.database.url.is_empty() {
            return Err(QuotaError::Config("Database URL is required".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(QuotaError::Config(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        if self.auth.jwt_secret.is_empty() {
            return Err(QuotaError::Config("JWT secret is required".to_string()));
        }

        if self.auth.token_ttl_hours == 0 {
            return Err(QuotaError::Config(
                "Token lifetime must be at least one hour".to_string(),
            ));
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(QuotaError::Config(format!(
                "Unknown log format: {} (expected pretty or json)",
                other
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                listen_addr: "0.0.0.0:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://quota.db".to_string(),
                max_connections: 5,
            },
            auth: AuthConfig {
                jwt_secret: "change-me-in-production".to_string(),
                token_ttl_hours: 24,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
