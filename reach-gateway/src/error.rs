use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reach_core::errors::ReachError;
use reach_rules::RuleError;
use reach_synth::SynthesisError;
use serde_json::json;
use tracing::error;

pub type AppResult<T> = Result<T, AppError>;

/// Error returned by handlers, rendered as `{"error": message}`.
#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new<M: Into<String>>(status: StatusCode, message: M) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request<M: Into<String>>(message: M) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found<M: Into<String>>(message: M) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn unavailable<M: Into<String>>(message: M) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<ReachError> for AppError {
    fn from(err: ReachError) -> Self {
        match err {
            ReachError::Validation(message) => AppError::bad_request(message),
            ReachError::NotFound(message) => AppError::not_found(message),
            other => {
                error!(error = %other, "request failed");
                AppError::internal("Internal server error")
            }
        }
    }
}

impl From<RuleError> for AppError {
    fn from(err: RuleError) -> Self {
        if err.is_client_error() {
            AppError::bad_request(err.to_string())
        } else {
            error!(error = %err, "rule processing failed");
            AppError::internal("Internal server error")
        }
    }
}

impl From<SynthesisError> for AppError {
    fn from(err: SynthesisError) -> Self {
        if err.is_client_error() {
            AppError::bad_request(err.user_message())
        } else {
            error!(error = %err, "rule synthesis failed");
            AppError::internal(err.user_message())
        }
    }
}

/// Error for the routes that answer with a `{success, ...}` envelope.
#[derive(Debug, Clone)]
pub struct EnvelopeError(pub AppError);

pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

impl From<AppError> for EnvelopeError {
    fn from(err: AppError) -> Self {
        EnvelopeError(err)
    }
}

impl From<ReachError> for EnvelopeError {
    fn from(err: ReachError) -> Self {
        EnvelopeError(err.into())
    }
}

impl From<RuleError> for EnvelopeError {
    fn from(err: RuleError) -> Self {
        EnvelopeError(err.into())
    }
}

impl IntoResponse for EnvelopeError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "success": false, "error": self.0.message }));
        (self.0.status, body).into_response()
    }
}
