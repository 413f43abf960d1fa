use std::path::PathBuf;

use thiserror::Error;

use crate::schema::SchemaViolations;

/// Errors returned while building, translating or evaluating rule groups.
#[derive(Debug, Clone, Error)]
pub enum RuleError {
    #[error("rules path does not exist: {0}")]
    MissingPath(String),
    #[error("failed to read rules from {path}: {message}")]
    Io { path: String, message: String },
    #[error("failed to parse rules from {path}: {message}")]
    Parse { path: String, message: String },
    #[error("unknown condition field: {0}")]
    UnknownField(String),
    #[error("unknown condition operator: {0}")]
    UnknownOperator(String),
    #[error("unknown condition attribute: {0}")]
    UnknownAttribute(String),
    #[error("unknown combinator: {0}")]
    UnknownCombinator(String),
    #[error("malformed backend query: {0}")]
    MalformedQuery(String),
    #[error("rule tree expands to {groups} query groups, more than the limit of {limit}")]
    QueryTooComplex { groups: usize, limit: usize },
    #[error("backend query cannot be expressed as a rule tree: {0}")]
    Untranslatable(String),
    #[error("rule tree failed validation: {0}")]
    Schema(SchemaViolations),
    #[error("audience estimate failed: {0}")]
    Estimator(String),
}

impl RuleError {
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RuleError::Io {
            path: path.into().display().to_string(),
            message: source.to_string(),
        }
    }

    pub fn parse_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        RuleError::Parse {
            path: path.into().display().to_string(),
            message: message.into(),
        }
    }

    /// Whether the error was caused by caller input rather than a system fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, RuleError::Io { .. } | RuleError::Estimator(_))
    }
}
