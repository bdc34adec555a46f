//! CORS for the browser client.
//!
//! Wrapper around tower-http CORS with gateway configuration.

use crate::domain::config::CorsConfig;
use axum::http::{HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, Any, CorsLayer};

fn parse_all<T: std::str::FromStr>(items: &[String]) -> Vec<T> {
    items.iter().filter_map(|item| item.parse().ok()).collect()
}

/// Create CORS layer from gateway config
pub fn create_cors_layer(config: &CorsConfig) -> CorsLayer {
    if !config.enabled {
        return CorsLayer::very_permissive();
    }

    let wildcard = |items: &[String]| items.iter().any(|item| item == "*");
    let credentials = config.allow_credentials && !wildcard(&config.allowed_origins);

    let mut cors = CorsLayer::new()
        .allow_methods(parse_all::<Method>(&config.allowed_methods))
        .max_age(Duration::from_secs(config.max_age));

    cors = if wildcard(&config.allowed_origins) {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(parse_all::<HeaderValue>(&config.allowed_origins))
    };

    // A literal `*` header list is rejected by browsers (and tower-http)
    // alongside credentials, so echo the requested headers instead.
    cors = if wildcard(&config.allowed_headers) && credentials {
        cors.allow_headers(AllowHeaders::mirror_request())
    } else if wildcard(&config.allowed_headers) {
        cors.allow_headers(Any)
    } else {
        cors.allow_headers(parse_all::<HeaderName>(&config.allowed_headers))
    };

    if !config.expose_headers.is_empty() {
        cors = cors.expose_headers(parse_all::<HeaderName>(&config.expose_headers));
    }

    // Credentials cannot be combined with a wildcard origin.
    if credentials {
        cors = cors.allow_credentials(true);
    }

    cors
}
