use reach_rules::SchemaViolations;
use thiserror::Error;

/// Failures talking to the text generation service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generator rate limit exceeded (HTTP 429)")]
    RateLimited,
    #[error("invalid generator url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("generator HTTP request failed: {0}")]
    Http(String),
    #[error("generator returned unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("failed to decode generator response: {0}")]
    Decode(String),
    #[error("generator returned no text")]
    EmptyResponse,
}

impl GenerationError {
    /// Only rate limiting is worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GenerationError::RateLimited)
    }
}

/// Failures turning user text into rules or messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("failed to parse generator response: {0}")]
    Structure(String),
    #[error("generated rules do not match the required structure: {0}")]
    InvalidStructure(SchemaViolations),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl SynthesisError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, SynthesisError::InvalidInput(_))
    }

    /// Message safe to show to end users. Diagnostics stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            SynthesisError::InvalidInput(message) => message.clone(),
            _ => "Failed to convert description to rules".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_hides_diagnostics() {
        let err = SynthesisError::Structure("expected value at line 1 column 1".into());
        assert_eq!(err.user_message(), "Failed to convert description to rules");
        assert!(!err.is_client_error());

        let input = SynthesisError::InvalidInput("Description is required".into());
        assert_eq!(input.user_message(), "Description is required");
        assert!(input.is_client_error());
    }

    #[test]
    fn only_rate_limits_are_retryable() {
        assert!(GenerationError::RateLimited.is_rate_limited());
        assert!(!GenerationError::Http("reset".into()).is_rate_limited());
        assert!(!GenerationError::UnexpectedStatus {
            status: 500,
            body: String::new()
        }
        .is_rate_limited());
    }
}
