//! Per-IP request throttling.
//!
//! A token bucket per client address sits in front of every route. This is
//! about protecting the gateway and its provider credits from a single noisy
//! client; the per-user daily image allowance lives in `domain::quota`.

use crate::domain::config::RateLimitConfig;
use crate::domain::error::ApiError;
use crate::middleware::metrics::GatewayMetrics;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::{Layer, Service};
use tracing::{debug, warn};

struct ClientBucket {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    last_seen: Instant,
}

impl ClientBucket {
    fn new(config: &RateLimitConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(per_second);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(per_second).allow_burst(burst)),
            last_seen: Instant::now(),
        }
    }

    fn check(&mut self) -> Result<(), Duration> {
        self.last_seen = Instant::now();
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()))
    }
}

/// Rate limiter state shared across requests
pub struct RateLimitState {
    buckets: DashMap<IpAddr, ClientBucket>,
    config: RateLimitConfig,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Admit a request from `ip`, or return how long it should wait.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        if !self.config.enabled || self.config.whitelist.contains(&ip) {
            return Ok(());
        }

        let mut bucket = self.buckets.entry(ip).or_insert_with(|| {
            debug!(ip = %ip, "Creating rate limit bucket");
            ClientBucket::new(&self.config)
        });
        bucket.check()
    }

    /// Drop buckets not touched within `max_idle`.
    pub fn cleanup(&self, max_idle: Duration) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_seen) <= max_idle);
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket_idle(&self) -> Duration {
        self.config.bucket_idle
    }
}

/// Rate limit layer
#[derive(Clone)]
pub struct RateLimitLayer {
    state: Arc<RateLimitState>,
    metrics: Arc<GatewayMetrics>,
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            state: Arc::new(RateLimitState::new(config)),
            metrics,
        }
    }

    pub fn state(&self) -> Arc<RateLimitState> {
        Arc::clone(&self.state)
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            state: Arc::clone(&self.state),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Rate limit service
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    state: Arc<RateLimitState>,
    metrics: Arc<GatewayMetrics>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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
        let ip = client_ip(&req, &self.state.config.trusted_proxies);
        let verdict = self.state.check(ip);
        let metrics = Arc::clone(&self.metrics);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match verdict {
                Ok(()) => inner.call(req).await,
                Err(wait) => {
                    let retry_ms = (wait.as_millis() as u64).max(1);
                    metrics.record_rate_limit_rejection();
                    warn!(ip = %ip, path = %req.uri().path(), retry_after_ms = retry_ms, "Rate limit exceeded");
                    Ok(ApiError::rate_limited(retry_ms).into_response())
                }
            }
        })
    }
}

/// Address of the calling client.
///
/// The socket peer, unless the peer is one of `trusted_proxies`. Then the
/// `X-Forwarded-For` chain is read right to left and the first hop that is
/// not itself a trusted proxy wins, with `X-Real-IP` as the fallback. A
/// request without connection info (in-process routing) counts as
/// localhost.
pub fn client_ip<B>(req: &Request<B>, trusted_proxies: &[IpAddr]) -> IpAddr {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]));
    if !trusted_proxies.contains(&peer) {
        return peer;
    }

    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    };
    let hops: Vec<IpAddr> = header("x-forwarded-for")
        .split(',')
        .filter_map(|hop| hop.trim().parse().ok())
        .collect();

    hops.iter()
        .rev()
        .find(|hop| !trusted_proxies.contains(hop))
        .or_else(|| hops.first())
        .copied()
        .or_else(|| header("x-real-ip").trim().parse().ok())
        .unwrap_or(peer)
}

/// Background task to clean up idle buckets
pub async fn cleanup_task(state: Arc<RateLimitState>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let before = state.bucket_count();
        state.cleanup(state.bucket_idle());
        let removed = before.saturating_sub(state.bucket_count());
        if removed > 0 {
            debug!(removed, "Pruned idle rate limit buckets");
        }
    }
}
