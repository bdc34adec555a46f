//! Middleware stack for the studio gateway.
//!
//! Layer order: Request → Tracing → Metrics → CORS → RateLimit → Validation → Timeout → Handler
//!
//! ## Circuit Breaker
//!
//! The circuit breaker is not a tower layer. `StudioService` consults it
//! around each provider call so an unhealthy provider fails fast with
//! `Overloaded` while the rest of the API keeps working.

pub mod auth;
pub mod circuit_breaker;
pub mod cors;
pub mod metrics;
pub mod rate_limit;
pub mod timeout;
pub mod tracing;
pub mod validation;

pub use auth::bearer_token;
pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerManager, CircuitState, CircuitStats};
pub use cors::create_cors_layer;
pub use metrics::{GatewayMetrics, MetricsLayer, MetricsSnapshot, RequestTimer};
pub use rate_limit::{cleanup_task, client_ip, RateLimitLayer, RateLimitState};
pub use timeout::TimeoutLayer;
pub use tracing::TracingLayer;
pub use validation::{validate_json_body, ValidationLayer};

use crate::domain::config::GatewayConfig;
use std::sync::Arc;

/// Middleware stack builder
pub struct MiddlewareStack {
    pub tracing: TracingLayer,
    pub metrics_layer: MetricsLayer,
    pub rate_limit: RateLimitLayer,
    pub validation: ValidationLayer,
    pub timeout: TimeoutLayer,
    pub metrics: Arc<GatewayMetrics>,
    pub circuit_breaker: Arc<CircuitBreakerManager>,
}

impl MiddlewareStack {
    /// Create middleware stack from gateway config
    pub fn from_config(config: &GatewayConfig) -> Self {
        let metrics = Arc::new(GatewayMetrics::new());
        Self {
            tracing: TracingLayer::new(),
            metrics_layer: MetricsLayer::new(Arc::clone(&metrics)),
            rate_limit: RateLimitLayer::new(config.rate_limit.clone(), Arc::clone(&metrics)),
            validation: ValidationLayer::new(config.limits.clone()),
            timeout: TimeoutLayer::new(config.timeouts.clone()),
            metrics,
            circuit_breaker: Arc::new(CircuitBreakerManager::new(
                config.circuit_breaker.to_middleware_config(),
            )),
        }
    }

    /// Get shared metrics
    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Get rate limit state for cleanup task
    pub fn rate_limit_state(&self) -> Arc<RateLimitState> {
        self.rate_limit.state()
    }

    /// Get circuit breaker manager
    pub fn circuit_breaker(&self) -> Arc<CircuitBreakerManager> {
        Arc::clone(&self.circuit_breaker)
    }
}
