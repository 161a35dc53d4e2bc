//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use crate::options::UnresolvedReferencePolicy;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Docker
            port: 3000,
        }
    }
}

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub max_pool_size: usize,
    /// Registered as connection `source` at startup
    pub source_url: Option<String>,
    /// Registered as connection `target` at startup
    pub target_url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 10,
            source_url: None,
            target_url: None,
        }
    }
}

/// Defaults applied to every Download / Upload
#[derive(Debug, Clone, Default)]
pub struct TransferConfig {
    pub timeout: Option<Duration>,
    pub unresolved_references: UnresolvedReferencePolicy,
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub transfer: TransferConfig,
    pub cors: CorsConfig,
}

impl Settings {
    /// Load settings from `.env` and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let server = ServerConfig {
            host: parse_var(&lookup, "HOST")?.unwrap_or(defaults.server.host),
            port: parse_var(&lookup, "PORT")?.unwrap_or(defaults.server.port),
        };

        let database = DatabaseConfig {
            max_pool_size: parse_var(&lookup, "DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.database.max_pool_size),
            source_url: non_empty(lookup("SOURCE_DATABASE_URL")),
            target_url: non_empty(lookup("TARGET_DATABASE_URL")),
        };

        let transfer = TransferConfig {
            timeout: parse_var::<u64, _>(&lookup, "CLONE_TIMEOUT_SECS")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            unresolved_references: parse_var(&lookup, "CLONE_UNRESOLVED_REFERENCES")?
                .unwrap_or_default(),
        };

        let cors = CorsConfig {
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors.allowed_origins),
        };

        Ok(Self {
            server,
            database,
            transfer,
            cors,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse an optional variable; a present but malformed value is an error
fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup(name)) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                name: name.to_string(),
                reason: e.to_string(),
            }),
    }
}
