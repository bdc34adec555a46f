//! Request body validation.
//!
//! Enforces the request size limit and requires JSON object bodies on
//! POST routes before anything reaches a handler.

use crate::domain::error::ApiError;
use crate::domain::LimitsConfig;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::warn;

/// Validation layer
#[derive(Clone)]
pub struct ValidationLayer {
    config: Arc<LimitsConfig>,
}

impl ValidationLayer {
    pub fn new(config: LimitsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for ValidationLayer {
    type Service = ValidationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ValidationService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// Validation service
#[derive(Clone)]
pub struct ValidationService<S> {
    inner: S,
    config: Arc<LimitsConfig>,
}

impl<S> Service<Request<Body>> for ValidationService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let max = self.config.max_request_size;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if let Some(len) = declared_length(&req) {
                if len > max {
                    warn!(size = len, max, "Request too large (from header)");
                    return Ok(ApiError::payload_too_large(len, max).into_response());
                }
            }

            if req.method() != Method::POST {
                return inner.call(req).await;
            }

            let (parts, body) = req.into_parts();
            let bytes = match to_bytes(body, max).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, max, "Request body rejected");
                    return Ok(ApiError::payload_too_large(max.saturating_add(1), max).into_response());
                }
            };

            if let Err(e) = validate_json_body(&bytes) {
                warn!(path = %parts.uri.path(), error = %e, "Malformed request body");
                return Ok(e.into_response());
            }

            inner.call(Request::from_parts(parts, Body::from(bytes))).await
        })
    }
}

fn declared_length<B>(req: &Request<B>) -> Option<usize> {
    req.headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// An empty body is allowed (sign-out); anything else must be a JSON object.
pub fn validate_json_body(body: &Bytes) -> Result<(), ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(_)) => Ok(()),
        Ok(_) => Err(ApiError::invalid_request("Request body must be a JSON object")),
        Err(e) => Err(ApiError::invalid_request(format!("Invalid JSON body: {e}"))),
    }
}
