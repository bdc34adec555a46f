//! Route table and middleware wiring.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;

use crate::domain::{ApiError, ErrorKind};
use crate::handlers::{auth, gallery, generate, meta};
use crate::middleware::{create_cors_layer, MiddlewareStack};
use crate::studio::StudioService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub studio: Arc<StudioService>,
}

/// Build the full HTTP router.
///
/// Layer order (outermost first): tracing, metrics, CORS, per-IP rate
/// limit, body validation, per-route timeout.
pub fn build_router(studio: Arc<StudioService>, stack: &MiddlewareStack) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(stack.tracing.clone())
        .layer(stack.metrics_layer.clone())
        .layer(create_cors_layer(&studio.config().cors))
        .layer(stack.rate_limit.clone())
        .layer(stack.validation.clone())
        .layer(stack.timeout.clone());

    Router::new()
        .route("/health", get(meta::health))
        .route("/metrics", get(meta::metrics))
        .route("/api/styles", get(meta::style_catalog))
        .route("/api/auth/signup", post(auth::sign_up))
        .route("/api/auth/signin", post(auth::sign_in))
        .route("/api/auth/signout", post(auth::sign_out))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/google", get(auth::google_url))
        .route("/api/auth/google/callback", post(auth::google_callback))
        .route("/api/generate", post(generate::generate))
        .route("/api/enhance", post(generate::enhance))
        .route("/api/images", get(gallery::history))
        .route("/api/explore", get(gallery::explore))
        .route("/api/quota", get(gallery::quota))
        .fallback(not_found)
        .layer(middleware)
        .with_state(AppState { studio })
}

async fn not_found() -> ApiError {
    ApiError::new(ErrorKind::NotFound, "Route not found")
}
