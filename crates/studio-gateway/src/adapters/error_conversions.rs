//! Reconciliation of adapter failures into the client error taxonomy.
//!
//! One function per provider family. Each decides which `ErrorKind` a
//! `ProviderError` becomes and which message the user sees.

use crate::domain::{ApiError, ErrorKind, ProviderError};

/// Map a generation provider failure.
pub fn reconcile_generation(err: ProviderError) -> ApiError {
    match err {
        ProviderError::Http { status, body } => match status {
            400 | 422 => ApiError::invalid_request(
                "Invalid request. Please check your prompt and settings.",
            ),
            401 | 403 => ApiError::new(
                ErrorKind::ProviderAuth,
                "Authentication failed. Check your image generation API token.",
            ),
            408 => ApiError::timeout(),
            429 => ApiError::new(
                ErrorKind::RateLimited,
                "Rate limit exceeded. Please wait a moment and try again.",
            ),
            503 => ApiError::overloaded(),
            _ => ApiError::new(
                ErrorKind::GenerationFailed,
                format!("AI Image Generation Error: {}", summarize(&body, status)),
            ),
        },
        ProviderError::Network(_) => ApiError::new(
            ErrorKind::Network,
            "Network error during AI image generation. Please check your internet connection.",
        ),
        ProviderError::Decode(_) => ApiError::new(
            ErrorKind::InvalidUpstream,
            "Invalid response from AI model: No image received.",
        ),
        ProviderError::NotConfigured(_) => ApiError::not_configured("Image generation"),
        ProviderError::Timeout => ApiError::timeout(),
        ProviderError::Failed(reason) => ApiError::new(ErrorKind::GenerationFailed, reason),
        ProviderError::Unauthorized(_) => ApiError::new(
            ErrorKind::ProviderAuth,
            "Authentication failed. Check your image generation API token.",
        ),
    }
}

/// Map an auth provider (or OAuth) failure.
pub fn reconcile_auth(err: ProviderError) -> ApiError {
    match err {
        ProviderError::Unauthorized(message) => {
            ApiError::new(ErrorKind::InvalidCredentials, message)
        }
        ProviderError::Http { status, body } => match status {
            400 | 422 => ApiError::invalid_credentials(summarize(&body, status)),
            401 | 403 => ApiError::unauthenticated(),
            429 => ApiError::new(
                ErrorKind::RateLimited,
                "Too many attempts. Please wait a moment and try again.",
            ),
            _ => ApiError::new(
                ErrorKind::Internal,
                format!("Authentication service error: {}", summarize(&body, status)),
            ),
        },
        ProviderError::NotConfigured(what) => ApiError::not_configured(what),
        ProviderError::Network(_) => ApiError::new(
            ErrorKind::Network,
            "Network error contacting the authentication service.",
        ),
        ProviderError::Timeout => ApiError::new(
            ErrorKind::Timeout,
            "The authentication service timed out. Please try again.",
        ),
        ProviderError::Decode(details) | ProviderError::Failed(details) => {
            ApiError::internal(format!("Authentication service error: {details}"))
        }
    }
}

/// Map a storage or row persistence failure.
pub fn reconcile_storage(err: ProviderError) -> ApiError {
    match err {
        ProviderError::NotConfigured(what) => ApiError::not_configured(what),
        other => ApiError::storage(other),
    }
}

/// Upstream bodies can be whole HTML pages; keep the first line and cap it.
fn summarize(body: &str, status: u16) -> String {
    const MAX: usize = 200;
    let line = body.lines().map(str::trim).find(|l| !l.is_empty());
    match line {
        Some(line) if line.chars().count() > MAX => {
            let head: String = line.chars().take(MAX).collect();
            format!("{head}...")
        }
        Some(line) => line.to_string(),
        None => format!("HTTP {status}"),
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::internal(e.to_string())
    }
}
