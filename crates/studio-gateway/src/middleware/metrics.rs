//! Gateway metrics.
//!
//! Plain atomic counters, exported as JSON for the `/metrics` endpoint and as
//! Prometheus text when scraped with `Accept: text/plain`.

use axum::{body::Body, http::Request, response::Response};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

/// Studio gateway metrics
#[derive(Default)]
pub struct GatewayMetrics {
    requests_total: AtomicU64,
    requests_success: AtomicU64,
    requests_client_error: AtomicU64,
    requests_server_error: AtomicU64,
    rate_limit_rejected: AtomicU64,

    generations_started: AtomicU64,
    generations_succeeded: AtomicU64,
    generations_failed: AtomicU64,
    quota_rejections: AtomicU64,
    storage_fallbacks: AtomicU64,
    save_failures: AtomicU64,

    enhancements: AtomicU64,
    enhancement_failures: AtomicU64,

    total_latency_ms: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub success: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub rate_limited: u64,
    pub generations_started: u64,
    pub generations_succeeded: u64,
    pub generations_failed: u64,
    pub quota_rejections: u64,
    pub storage_fallbacks: u64,
    pub save_failures: u64,
    pub enhancements: u64,
    pub enhancement_failures: u64,
    pub average_latency_ms: f64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished HTTP request by status code.
    pub fn record_request(&self, status: u16, latency_ms: u64) {
        bump(&self.requests_total);
        match status {
            200..=399 => bump(&self.requests_success),
            400..=499 => bump(&self.requests_client_error),
            _ => bump(&self.requests_server_error),
        }
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_rate_limit_rejection(&self) {
        bump(&self.rate_limit_rejected);
    }

    pub fn record_generation_started(&self) {
        bump(&self.generations_started);
    }

    pub fn record_generation_succeeded(&self) {
        bump(&self.generations_succeeded);
    }

    pub fn record_generation_failed(&self) {
        bump(&self.generations_failed);
    }

    pub fn record_quota_rejection(&self) {
        bump(&self.quota_rejections);
    }

    /// The provider URL was kept because copying into storage failed.
    pub fn record_storage_fallback(&self) {
        bump(&self.storage_fallbacks);
    }

    /// The history row could not be written.
    pub fn record_save_failure(&self) {
        bump(&self.save_failures);
    }

    pub fn record_enhancement(&self, ok: bool) {
        if ok {
            bump(&self.enhancements);
        } else {
            bump(&self.enhancement_failures);
        }
    }

    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.requests_total.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests: load(&self.requests_total),
            success: load(&self.requests_success),
            client_errors: load(&self.requests_client_error),
            server_errors: load(&self.requests_server_error),
            rate_limited: load(&self.rate_limit_rejected),
            generations_started: load(&self.generations_started),
            generations_succeeded: load(&self.generations_succeeded),
            generations_failed: load(&self.generations_failed),
            quota_rejections: load(&self.quota_rejections),
            storage_fallbacks: load(&self.storage_fallbacks),
            save_failures: load(&self.save_failures),
            enhancements: load(&self.enhancements),
            enhancement_failures: load(&self.enhancement_failures),
            average_latency_ms: self.average_latency_ms(),
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        let s = self.snapshot();
        serde_json::json!({
            "requests": {
                "total": s.requests,
                "success": s.success,
                "client_errors": s.client_errors,
                "server_errors": s.server_errors,
                "rate_limited": s.rate_limited,
            },
            "generation": {
                "started": s.generations_started,
                "succeeded": s.generations_succeeded,
                "failed": s.generations_failed,
                "quota_rejections": s.quota_rejections,
                "storage_fallbacks": s.storage_fallbacks,
                "save_failures": s.save_failures,
            },
            "enhancement": {
                "succeeded": s.enhancements,
                "failed": s.enhancement_failures,
            },
            "latency": {
                "average_ms": s.average_latency_ms,
            }
        })
    }

    /// Export metrics in Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let counters: [(&str, &str, u64); 13] = [
            ("studio_requests_total", "Total HTTP requests", s.requests),
            ("studio_requests_success_total", "Requests answered 2xx/3xx", s.success),
            ("studio_requests_client_error_total", "Requests answered 4xx", s.client_errors),
            ("studio_requests_server_error_total", "Requests answered 5xx", s.server_errors),
            ("studio_rate_limit_rejected_total", "Requests throttled per IP", s.rate_limited),
            ("studio_generations_started_total", "Generation attempts", s.generations_started),
            ("studio_generations_succeeded_total", "Images generated", s.generations_succeeded),
            ("studio_generations_failed_total", "Failed generations", s.generations_failed),
            ("studio_quota_rejections_total", "Generations refused by daily quota", s.quota_rejections),
            ("studio_storage_fallbacks_total", "Images served from provider URL", s.storage_fallbacks),
            ("studio_save_failures_total", "History rows that failed to save", s.save_failures),
            ("studio_enhancements_total", "Prompts enhanced", s.enhancements),
            ("studio_enhancement_failures_total", "Failed enhancements", s.enhancement_failures),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            let _ = write!(
                out,
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            );
        }
        let _ = write!(
            out,
            "# HELP studio_average_latency_ms Average request latency\n\
             # TYPE studio_average_latency_ms gauge\n\
             studio_average_latency_ms {:.2}\n",
            s.average_latency_ms
        );
        out
    }
}

/// Request timing helper
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<GatewayMetrics>,
}

impl RequestTimer {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self, status: u16) {
        let latency_ms = self.start.elapsed().as_millis() as u64;
        self.metrics.record_request(status, latency_ms);
    }
}

/// Counts every response by status class.
#[derive(Clone)]
pub struct MetricsLayer {
    metrics: Arc<GatewayMetrics>,
}

impl MetricsLayer {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: Arc<GatewayMetrics>,
}

impl<S> Service<Request<Body>> for MetricsService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let timer = RequestTimer::new(Arc::clone(&self.metrics));
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let result = inner.call(req).await;
            let status = match &result {
                Ok(response) => response.status().as_u16(),
                Err(_) => 500,
            };
            timer.finish(status);
            result
        })
    }
}
