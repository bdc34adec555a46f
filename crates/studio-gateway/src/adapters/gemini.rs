//! Prompt enhancement through the Gemini `generateContent` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{error_message, http_client};
use crate::domain::config::{EnhancementConfig, TimeoutConfig};
use crate::domain::prompt::{enhancement_instruction, preview};
use crate::domain::ProviderError;
use crate::ports::{PromptEnhancer, ProviderResult};

pub struct GeminiEnhancer {
    client: Client,
    config: EnhancementConfig,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

impl GenerateContentResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

impl GeminiEnhancer {
    pub fn new(config: EnhancementConfig, timeouts: &TimeoutConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: http_client(timeouts.connect, timeouts.enhance)?,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl PromptEnhancer for GeminiEnhancer {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    #[instrument(skip_all, fields(prompt = %preview(prompt)))]
    async fn enhance(&self, prompt: &str) -> ProviderResult<String> {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured("Prompt enhancement"));
        }
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(enhancement_instruction(prompt)),
                }],
            }],
        };
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", &self.config.api_key)])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: GenerateContentResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(ProviderError::Http {
                    status: status.as_u16(),
                    body,
                })
            }
            Err(e) => return Err(ProviderError::Decode(e.to_string())),
        };

        if let Some(error) = parsed.error {
            return Err(ProviderError::Http {
                status: error.code.unwrap_or(status.as_u16()),
                body: if error.message.is_empty() {
                    error_message(&body).unwrap_or(body)
                } else {
                    error.message
                },
            });
        }

        parsed
            .first_text()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ProviderError::Decode("no candidate text in response".to_string()))
    }
}
