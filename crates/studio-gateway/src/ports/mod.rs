//! Ports (hexagonal boundaries) for the studio gateway.

pub mod outbound;

pub use outbound::*;

use std::sync::Arc;

/// Every outbound dependency the studio service talks to.
#[derive(Clone)]
pub struct StudioPorts {
    pub auth: Arc<dyn AuthProvider>,
    pub oauth: Arc<dyn OAuthProvider>,
    pub generator: Arc<dyn ImageGenerator>,
    pub enhancer: Arc<dyn PromptEnhancer>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub objects: Arc<dyn ObjectStore>,
    pub images: Arc<dyn ImageRepository>,
    pub quota_store: Arc<dyn QuotaStore>,
    pub clock: Arc<dyn TimeSource>,
}
