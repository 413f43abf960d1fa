use std::io;

use thiserror::Error;

/// Result type used across the Reach core crate.
pub type Result<T> = std::result::Result<T, ReachError>;

/// Canonical error representation shared by all services.
#[derive(Debug, Error)]
pub enum ReachError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    General(String),
}

impl ReachError {
    pub fn validation(message: impl Into<String>) -> Self {
        ReachError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ReachError::NotFound(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ReachError::Storage(message.into())
    }
}

impl From<serde_json::Error> for ReachError {
    fn from(err: serde_json::Error) -> Self {
        ReachError::Deserialization(err.to_string())
    }
}

impl From<sqlx::Error> for ReachError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ReachError::NotFound("row not found".into()),
            other => ReachError::Storage(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for ReachError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ReachError::Storage(format!("migration failed: {err}"))
    }
}

impl From<anyhow::Error> for ReachError {
    fn from(err: anyhow::Error) -> Self {
        ReachError::General(err.to_string())
    }
}

/// Dedicated configuration error used by the configuration modules.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {key}: {source}")]
    InvalidEnvVar {
        key: &'static str,
        #[source]
        source: std::env::VarError,
    },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ConfigError> for ReachError {
    fn from(value: ConfigError) -> Self {
        ReachError::Config(value.to_string())
    }
}
