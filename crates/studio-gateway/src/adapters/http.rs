//! Downloads provider-hosted images so they can be copied into storage.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{ensure_success, http_client};
use crate::domain::config::TimeoutConfig;
use crate::ports::{FetchedImage, ImageFetcher, ProviderResult};

pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(timeouts: &TimeoutConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: http_client(timeouts.connect, timeouts.default)?,
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> ProviderResult<FetchedImage> {
        let response = ensure_success(self.client.get(url).send().await?).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        debug!(size = bytes.len(), content_type = ?content_type, "Downloaded image");
        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}
