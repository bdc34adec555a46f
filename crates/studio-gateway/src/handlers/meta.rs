//! Health, metrics and the style catalog.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shared_types::StylePreset;

use crate::domain::styles;
use crate::router::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "providers": state.studio.provider_status(),
        "circuits": state.studio.circuits(),
    }))
}

/// JSON by default; Prometheus text for `Accept: text/plain`.
pub async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let wants_text = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/plain"));

    if wants_text {
        (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            state.studio.metrics().to_prometheus(),
        )
            .into_response()
    } else {
        let mut body = state.studio.metrics().to_json();
        body["circuits"] = json!(state.studio.circuits());
        Json(body).into_response()
    }
}

pub async fn style_catalog() -> Json<&'static [StylePreset]> {
    Json(styles::all())
}
