//! Adapters for the studio gateway.
//!
//! Live implementations of the outbound ports over HTTP (reqwest), plus the
//! in-memory implementations used by tests and offline mode.

pub mod error_conversions;
pub mod gemini;
pub mod google;
pub mod http;
pub mod memory;
pub mod quota_store;
pub mod replicate;
pub mod supabase;

pub use error_conversions::{reconcile_auth, reconcile_generation, reconcile_storage};
pub use gemini::GeminiEnhancer;
pub use google::GoogleOAuth;
pub use http::HttpImageFetcher;
pub use memory::offline_ports;
pub use quota_store::InMemoryQuotaStore;
pub use replicate::ReplicateGenerator;
pub use supabase::{SupabaseAuth, SupabaseRows, SupabaseStorage};

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;

use crate::domain::{GatewayConfig, ProviderError};
use crate::ports::{ProviderResult, QuotaStore, StudioPorts, SystemTimeSource};

/// Live HTTP adapters for every provider named in `config`.
///
/// Providers without credentials are still built; they report
/// `is_configured() == false` and the service answers `NotConfigured`.
pub fn live_ports(
    config: &GatewayConfig,
    quota_store: Arc<dyn QuotaStore>,
) -> ProviderResult<StudioPorts> {
    let timeouts = &config.timeouts;
    Ok(StudioPorts {
        auth: Arc::new(SupabaseAuth::new(config.auth.clone(), timeouts)?),
        oauth: Arc::new(GoogleOAuth::new(config.auth.clone(), timeouts)?),
        generator: Arc::new(ReplicateGenerator::new(config.generation.clone(), timeouts)?),
        enhancer: Arc::new(GeminiEnhancer::new(config.enhancement.clone(), timeouts)?),
        fetcher: Arc::new(HttpImageFetcher::new(timeouts)?),
        objects: Arc::new(SupabaseStorage::new(config.storage.clone(), timeouts)?),
        images: Arc::new(SupabaseRows::new(config.storage.clone(), timeouts)?),
        quota_store,
        clock: Arc::new(SystemTimeSource),
    })
}

/// Build the HTTP client shared by one adapter.
pub(crate) fn http_client(connect: Duration, request: Duration) -> ProviderResult<Client> {
    Client::builder()
        .connect_timeout(connect)
        .timeout(request)
        .user_agent(concat!("prompt-studio/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::Network(format!("failed to build HTTP client: {e}")))
}

/// Turn a non-2xx response into `ProviderError::Http` carrying its body.
pub(crate) async fn ensure_success(response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Http {
        status: status.as_u16(),
        body,
    })
}

/// Error bodies seen from the hosted providers.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorEnvelope {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    detail: Option<String>,
    error: Option<serde_json::Value>,
}

/// Best human-readable message in a provider error body.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    envelope
        .error_description
        .or(envelope.msg)
        .or(envelope.message)
        .or(envelope.detail)
        .or_else(|| match envelope.error? {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Object(map) => map
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            _ => None,
        })
}
