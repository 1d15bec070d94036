#![allow(dead_code)]

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::chat::models::{CorrelationId, CORRELATION_ID_HEADER};
use crate::correlation::current_correlation_id;
use crate::llm_client::LlmError;

/// Machine-readable error codes returned in `error.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidJson,
    ValidationError,
    RateLimitExceeded,
    GoogleQuotaExceeded,
    UpstreamError,
    InternalError,
    NotFound,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::GoogleQuotaExceeded => "GOOGLE_QUOTA_EXCEEDED",
            ErrorCode::UpstreamError => "UPSTREAM_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
        }
    }

    /// Whether a client may retry immediately. Rate-limit codes must wait for `Retry-After`.
    /// Sent to clients as `error.retryable`.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ErrorCode::RateLimitExceeded | ErrorCode::GoogleQuotaExceeded
        )
    }
}

/// Application-level error type for the HTTP surface.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Upstream quota exceeded, retry after {retry_after_secs}s: {detail}")]
    UpstreamQuota { retry_after_secs: u64, detail: String },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Quota {
                retry_after_secs,
                message,
            } => AppError::UpstreamQuota {
                retry_after_secs,
                detail: message,
            },
            LlmError::EmptyConversation => {
                AppError::Internal(anyhow::Error::new(LlmError::EmptyConversation))
            }
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::InvalidJson(_) => ErrorCode::InvalidJson,
            AppError::Validation(_) => ErrorCode::ValidationError,
            AppError::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            AppError::UpstreamQuota { .. } => ErrorCode::GoogleQuotaExceeded,
            AppError::Upstream(_) => ErrorCode::UpstreamError,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidJson(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } | AppError::UpstreamQuota { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AppError::RateLimited { retry_after_secs }
            | AppError::UpstreamQuota {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// The message shown to the client. Upstream and internal detail stays in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::InvalidJson(msg) => format!("Request body is not valid JSON: {msg}"),
            AppError::Validation(msg) => msg.clone(),
            AppError::RateLimited { retry_after_secs } => format!(
                "Too many requests. Please try again in {retry_after_secs} seconds."
            ),
            AppError::UpstreamQuota { .. } => {
                "The AI service is temporarily at capacity. Please wait a moment.".to_string()
            }
            AppError::Upstream(_) => "The AI service is currently unavailable".to_string(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Internal(_) => "An internal server error occurred".to_string(),
        }
    }

    fn log(&self) {
        let code = self.code().as_str();
        match self {
            AppError::InvalidJson(msg) => tracing::warn!(code, "Rejected request: invalid JSON: {msg}"),
            AppError::Validation(msg) => tracing::warn!(code, "Rejected request: {msg}"),
            AppError::RateLimited { retry_after_secs } => {
                tracing::warn!(code, "Rate limit exceeded, retry after {retry_after_secs}s")
            }
            AppError::UpstreamQuota {
                retry_after_secs,
                detail,
            } => tracing::warn!(
                code,
                "Upstream quota exceeded, retry after {retry_after_secs}s: {detail}"
            ),
            AppError::Upstream(msg) => tracing::error!(code, "Upstream error: {msg}"),
            AppError::NotFound(msg) => tracing::debug!(code, "Not found: {msg}"),
            AppError::Internal(e) => tracing::error!(code, "Internal error: {e:?}"),
        }
    }

    pub fn with_correlation_id(self, correlation_id: CorrelationId) -> CorrelatedError {
        CorrelatedError {
            error: self,
            correlation_id,
        }
    }
}

/// An [`AppError`] paired with the correlation id of the request that produced it.
#[derive(Debug)]
pub struct CorrelatedError {
    pub error: AppError,
    pub correlation_id: CorrelationId,
}

impl IntoResponse for CorrelatedError {
    fn into_response(self) -> Response {
        self.error.log();

        let status = self.error.status();
        let code = self.error.code();
        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.error.public_message(),
                "retryable": code.is_retryable()
            },
            "correlationId": self.correlation_id.to_string()
        }));

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.correlation_id.to_string()) {
            headers.insert(CORRELATION_ID_HEADER, value);
        }
        if let Some(secs) = self.error.retry_after_secs() {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Errors raised outside the chat handler (e.g. the router fallback) use the id assigned to
/// the request by the correlation middleware.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.with_correlation_id(current_correlation_id())
            .into_response()
    }
}
