//! Per-route request timeouts.
//!
//! Generation covers the whole create-and-poll cycle, so it gets a much
//! longer budget than everything else.

use crate::domain::config::TimeoutConfig;
use crate::domain::{ApiError, ErrorKind};
use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tower::{Layer, Service};
use tracing::warn;

pub const GENERATE_PATH: &str = "/api/generate";
pub const ENHANCE_PATH: &str = "/api/enhance";

/// Timeout layer
#[derive(Clone)]
pub struct TimeoutLayer {
    config: Arc<TimeoutConfig>,
}

impl TimeoutLayer {
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// Timeout service
#[derive(Clone)]
pub struct TimeoutService<S> {
    inner: S,
    config: Arc<TimeoutConfig>,
}

impl<S> Service<Request<Body>> for TimeoutService<S>
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
        let limit = timeout_for_path(req.uri().path(), &self.config);
        let path = req.uri().path().to_string();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match timeout(limit, inner.call(req)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(path = %path, timeout_ms = limit.as_millis() as u64, "Request timed out");
                    Ok(timeout_error(&path, limit).into_response())
                }
            }
        })
    }
}

fn timeout_for_path(path: &str, config: &TimeoutConfig) -> Duration {
    match path {
        GENERATE_PATH => config.generate,
        ENHANCE_PATH => config.enhance,
        _ => config.default,
    }
}

fn timeout_error(path: &str, limit: Duration) -> ApiError {
    if path == GENERATE_PATH {
        ApiError::timeout()
    } else {
        ApiError::new(
            ErrorKind::Timeout,
            format!("Request exceeded {}s timeout", limit.as_secs()),
        )
    }
}
