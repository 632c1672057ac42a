/// Configuration management for the YachtLife backend
use crate::apple::APPLE_KEYS_URL;
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub apple: AppleConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Apple Sign-In configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppleConfig {
    /// Expected `aud` of identity tokens (the app's bundle / services id)
    pub client_id: String,
    pub keys_url: String,
    pub key_cache_ttl_secs: u64,
    pub http_timeout_secs: u64,
    pub clock_leeway_secs: u64,
}

/// Session token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level for this crate when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(AppError::Config(format!("Unknown log format: {}", other))),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database = DatabaseConfig {
            path: get("DATABASE_PATH", "./data/yachtlife.sqlite").into(),
            max_connections: parse_number(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
        };

        let client_id = lookup("APPLE_CLIENT_ID")
            .ok_or_else(|| AppError::Config("APPLE_CLIENT_ID is required".to_string()))?;

        let apple = AppleConfig {
            client_id,
            keys_url: get("APPLE_KEYS_URL", APPLE_KEYS_URL),
            key_cache_ttl_secs: parse_number(&lookup, "APPLE_KEYS_CACHE_TTL_SECS", 86_400)?,
            http_timeout_secs: parse_number(&lookup, "APPLE_HTTP_TIMEOUT_SECS", 10)?,
            clock_leeway_secs: parse_number(&lookup, "APPLE_CLOCK_LEEWAY_SECS", 0)?,
        };

        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| AppError::Config("JWT_SECRET is required".to_string()))?;

        let session = SessionConfig {
            jwt_secret,
            jwt_expiration_secs: parse_number(&lookup, "JWT_EXPIRATION_SECS", 86_400)?,
        };

        let logging = LoggingConfig {
            level: get("LOG_LEVEL", "info"),
            format: get("LOG_FORMAT", "pretty").parse()?,
        };

        Ok(AppConfig {
            database,
            apple,
            session,
            logging,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.apple.client_id.trim().is_empty() {
            return Err(AppError::Config("Apple client id cannot be empty".to_string()));
        }

        if self.apple.key_cache_ttl_secs == 0 {
            return Err(AppError::Config(
                "Apple key cache TTL must be greater than zero".to_string(),
            ));
        }

        if self.apple.http_timeout_secs == 0 {
            return Err(AppError::Config(
                "Apple HTTP timeout must be greater than zero".to_string(),
            ));
        }

        if self.session.jwt_secret.len() < 32 {
            return Err(AppError::Config(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.session.jwt_expiration_secs == 0 {
            return Err(AppError::Config(
                "JWT expiration must be greater than zero".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(AppError::Config(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("Invalid value for {}: {}", key, raw))),
        None => Ok(default),
    }
}
