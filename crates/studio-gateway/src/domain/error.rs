//! Studio error taxonomy.
//!
//! Every failure the browser client can see is an [`ApiError`]: a kind with a
//! stable code and HTTP status, a human message, and an optional retry hint.
//! Adapters report [`ProviderError`]s which are reconciled into `ApiError`
//! at the service boundary (see `adapters::error_conversions`).

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure categories shown to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidPrompt,
    InvalidRequest,
    InvalidCredentials,
    PayloadTooLarge,
    NotFound,
    Unauthenticated,
    /// The gateway's own provider credentials were rejected.
    ProviderAuth,
    QuotaExceeded,
    RateLimited,
    Overloaded,
    NotConfigured,
    Timeout,
    GenerationFailed,
    InvalidUpstream,
    Network,
    Storage,
    Internal,
}

impl ErrorKind {
    /// Stable string code used in the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidPrompt => "invalid_prompt",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::ProviderAuth => "provider_auth",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Overloaded => "overloaded",
            ErrorKind::NotConfigured => "not_configured",
            ErrorKind::Timeout => "timeout",
            ErrorKind::GenerationFailed => "generation_failed",
            ErrorKind::InvalidUpstream => "invalid_upstream",
            ErrorKind::Network => "network",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidPrompt
            | ErrorKind::InvalidRequest
            | ErrorKind::InvalidCredentials => StatusCode::BAD_REQUEST,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::QuotaExceeded | ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Overloaded | ErrorKind::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::ProviderAuth
            | ErrorKind::GenerationFailed
            | ErrorKind::InvalidUpstream
            | ErrorKind::Network => StatusCode::BAD_GATEWAY,
            ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether offering the user a "try again" action makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Overloaded
                | ErrorKind::RateLimited
                | ErrorKind::Timeout
                | ErrorKind::Network
                | ErrorKind::GenerationFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Client-facing error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    /// Set for rate limits so the client can back off.
    pub retry_after_ms: Option<u64>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_ms: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after_ms: u64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }

    pub fn invalid_prompt(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidPrompt, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCredentials, message)
    }

    pub fn payload_too_large(size: usize, max: usize) -> Self {
        Self::new(
            ErrorKind::PayloadTooLarge,
            format!("Request size {size} exceeds limit {max}"),
        )
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorKind::Unauthenticated, "User not authenticated")
    }

    pub fn quota_exceeded(limit: u32) -> Self {
        Self::new(
            ErrorKind::QuotaExceeded,
            format!(
                "You've reached your daily limit of {limit} images. Please try again tomorrow."
            ),
        )
    }

    /// Per-IP throttling at the gateway itself.
    pub fn rate_limited(retry_after_ms: u64) -> Self {
        Self::new(
            ErrorKind::RateLimited,
            "Too many requests. Please slow down and try again.",
        )
        .with_retry_after(retry_after_ms)
    }

    pub fn overloaded() -> Self {
        Self::new(
            ErrorKind::Overloaded,
            "AI model is currently overloaded or loading. Please try again in a few moments.",
        )
    }

    pub fn not_configured(service: &str) -> Self {
        Self::new(
            ErrorKind::NotConfigured,
            format!("{service} is not configured. Please contact the administrator."),
        )
    }

    pub fn timeout() -> Self {
        Self::new(
            ErrorKind::Timeout,
            "Image generation timed out. Please try again.",
        )
    }

    pub fn storage(details: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::Storage,
            format!("Failed to store image: {details}"),
        )
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, details)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    fn body(&self) -> ErrorBody<'_> {
        ErrorBody {
            error: ErrorPayload {
                code: self.kind.code(),
                message: &self.message,
                retryable: self.is_retryable(),
                retry_after_ms: self.retry_after_ms,
            },
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorPayload<'a>,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    code: &'static str,
    message: &'a str,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        if let Some(ms) = self.retry_after_ms {
            let secs = ms.div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type for studio operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Failure reported by an outbound adapter before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Non-success HTTP status with the (possibly truncated) body
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// Transport failure (DNS, connect, reset)
    #[error("network error: {0}")]
    Network(String),
    /// Response did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
    /// Credentials missing or placeholder
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    /// Gave up waiting
    #[error("timed out")]
    Timeout,
    /// Provider reported a failure with a reason
    #[error("{0}")]
    Failed(String),
    /// Caller credentials (user token, password) rejected
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl ProviderError {
    /// Whether the failure says the provider itself is unhealthy.
    ///
    /// Only these count towards opening a circuit; a rejected prompt or a
    /// model refusal does not.
    pub fn is_upstream_fault(&self) -> bool {
        match self {
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Network(_) | ProviderError::Timeout => true,
            ProviderError::Decode(_)
            | ProviderError::NotConfigured(_)
            | ProviderError::Failed(_)
            | ProviderError::Unauthorized(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// Gateway-level errors (startup and lifecycle, never sent to clients)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// I/O failure while serving or persisting
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress
    #[error("shutdown in progress")]
    ShuttingDown,
}
