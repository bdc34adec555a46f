//! Image generation over the Replicate predictions API.
//!
//! A prediction is created, then polled until it leaves the
//! `starting`/`processing` states or the attempt budget runs out.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::GenerationSettings;
use tracing::{debug, info, instrument, warn};

use super::{ensure_success, http_client};
use crate::domain::config::{GenerationConfig, TimeoutConfig};
use crate::domain::prompt::preview;
use crate::domain::ProviderError;
use crate::ports::{GenerationOutput, ImageGenerator, ProviderResult};

pub struct ReplicateGenerator {
    client: Client,
    config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct CreatePrediction<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    aspect_ratio: &'a str,
    output_format: &'a str,
    safety_filter_level: &'a str,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Other,
}

impl PredictionStatus {
    fn is_pending(self) -> bool {
        matches!(self, PredictionStatus::Starting | PredictionStatus::Processing)
    }
}

impl Prediction {
    fn state(&self) -> PredictionStatus {
        match self.status.as_str() {
            "starting" => PredictionStatus::Starting,
            "processing" => PredictionStatus::Processing,
            "succeeded" => PredictionStatus::Succeeded,
            "failed" => PredictionStatus::Failed,
            _ => PredictionStatus::Other,
        }
    }

    /// Output is either a URL string or a list whose first entry is one.
    fn output_url(&self) -> Option<String> {
        match self.output.as_ref()? {
            Value::String(url) if !url.is_empty() => Some(url.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str()).map(str::to_string),
            _ => None,
        }
    }

    fn error_text(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl ReplicateGenerator {
    pub fn new(config: GenerationConfig, timeouts: &TimeoutConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: http_client(timeouts.connect, timeouts.default)?,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.config.api_token)
    }

    async fn create(&self, prompt: &str, settings: &GenerationSettings) -> ProviderResult<Prediction> {
        let body = CreatePrediction {
            version: &self.config.model,
            input: PredictionInput {
                prompt,
                aspect_ratio: settings.aspect_ratio.as_str(),
                output_format: settings.output_format.as_str(),
                safety_filter_level: settings.safety_filter_level.as_str(),
            },
        };
        let response = self
            .client
            .post(self.url("/predictions"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn fetch(&self, id: &str) -> ProviderResult<Prediction> {
        let response = self
            .client
            .get(self.url(&format!("/predictions/{id}")))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ImageGenerator for ReplicateGenerator {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    #[instrument(skip_all, fields(prompt = %preview(prompt), aspect_ratio = %settings.aspect_ratio))]
    async fn generate(
        &self,
        prompt: &str,
        settings: &GenerationSettings,
    ) -> ProviderResult<GenerationOutput> {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured("Image generation"));
        }

        let mut prediction = self.create(prompt, settings).await?;
        info!(prediction_id = %prediction.id, "Prediction created");

        let mut attempts = 0;
        while prediction.state().is_pending() {
            if attempts >= self.config.max_poll_attempts {
                warn!(prediction_id = %prediction.id, attempts, "Prediction polling gave up");
                return Err(ProviderError::Timeout);
            }
            tokio::time::sleep(self.config.poll_interval).await;
            attempts += 1;
            prediction = self.fetch(&prediction.id).await?;
            debug!(prediction_id = %prediction.id, attempt = attempts, status = %prediction.status, "Polled prediction");
        }

        match prediction.state() {
            PredictionStatus::Succeeded => {
                let image_url = prediction.output_url().ok_or_else(|| {
                    ProviderError::Decode("prediction succeeded without output".to_string())
                })?;
                info!(prediction_id = %prediction.id, attempts, "Prediction succeeded");
                Ok(GenerationOutput {
                    image_url,
                    prediction_id: prediction.id,
                    model: self.config.model.clone(),
                })
            }
            PredictionStatus::Failed => Err(ProviderError::Failed(
                prediction
                    .error_text()
                    .unwrap_or_else(|| "Image generation failed".to_string()),
            )),
            _ => Err(ProviderError::Failed(format!(
                "Unexpected prediction status: {}",
                prediction.status
            ))),
        }
    }
}
