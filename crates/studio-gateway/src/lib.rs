// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! Studio Gateway - HTTP backend for the Prompt Studio image generator.
//!
//! Fronts four hosted providers (auth, image generation, prompt
//! enhancement, object storage) behind one JSON API with a single error
//! taxonomy and a server-side daily quota.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        STUDIO GATEWAY                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   Tracing → Metrics → CORS → RateLimit → Validation → Timeout    │
//! │                              │                                   │
//! │   ┌──────────────────────────┴───────────────────────────────┐   │
//! │   │  Handlers (auth, generate, enhance, gallery, meta)       │   │
//! │   └──────────────────────────┬───────────────────────────────┘   │
//! │   ┌──────────────────────────┴───────────────────────────────┐   │
//! │   │  StudioService  (quota, styles, circuits, reconcile)     │   │
//! │   └──────────────────────────┬───────────────────────────────┘   │
//! │                         StudioPorts                              │
//! └──────────────────────────────┼───────────────────────────────────┘
//!        ┌──────────────┬────────┴─────┬───────────────┐
//!        ▼              ▼              ▼               ▼
//!   auth provider   predictions   text model    storage + rows
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use studio_gateway::{adapters, GatewayConfig, StudioGateway};
//!
//! let config = GatewayConfig::default();
//! let ports = adapters::live_ports(&config, quota_store)?;
//! let mut gateway = StudioGateway::new(config, ports)?;
//! gateway.start().await?;
//! ```
//!
//! # Failure handling
//!
//! - Every provider failure is reconciled into [`ApiError`]
//! - Generation, storage and enhancement sit behind per-provider circuits
//! - Enhancement failures fall back to the original prompt
//! - A storage failure keeps the provider URL instead of failing the request

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod router;
pub mod service;
pub mod studio;

// Re-exports for public API
pub use domain::config::GatewayConfig;
pub use domain::error::{ApiError, ApiResult, ErrorKind, GatewayError, ProviderError};
pub use middleware::{GatewayMetrics, MetricsSnapshot};
pub use ports::StudioPorts;
pub use router::{build_router, AppState};
pub use service::StudioGateway;
pub use studio::StudioService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
