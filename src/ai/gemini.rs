//! Google Gemini completion client.
//!
//! Thin `generateContent` REST wrapper. The HTTP client carries the
//! configured timeout, so a hung provider surfaces as an ordinary error
//! within bounded time.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{AiConfig, AiResult, CompletionError, CompletionService};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: AiConfig,
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: Option<u32>,
}

impl GeminiClient {
    pub fn new(config: AiConfig) -> AiResult<Self> {
        if config.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            client,
            base_url: BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    async fn complete(&self, prompt: &str) -> AiResult<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: Some(GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
            }),
        };

        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        debug!(model = %self.config.model, "requesting completion");

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response.json().await?;

        if let Some(usage) = &body.usage_metadata {
            info!(tokens = ?usage.total_token_count, "completion usage");
        }

        let text = body
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.clone())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CompletionError::Empty);
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AiConfig {
        AiConfig {
            api_key: "test-key".to_string(),
            model: "gemini-flash-latest".to_string(),
            max_tokens: Some(256),
            temperature: Some(0.1),
            timeout_seconds: 5,
        }
    }

    #[test]
    fn client_creation() {
        assert!(GeminiClient::new(test_config()).is_ok());
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let mut config = test_config();
        config.api_key = String::new();
        assert!(matches!(
            GeminiClient::new(config).err(),
            Some(CompletionError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error_not_a_hang() {
        let client = GeminiClient::new(test_config())
            .unwrap()
            .with_base_url("http://127.0.0.1:9/models".to_string());
        let result = client.complete("hello").await;
        assert!(result.is_err());
    }

    // Integration test - requires a live API key.
    #[tokio::test]
    #[ignore = "requires GEMINI_API_KEY environment variable"]
    async fn live_completion() {
        let config = AiConfig::default();
        if config.api_key.is_empty() {
            panic!("GEMINI_API_KEY environment variable required for integration test");
        }

        let client = GeminiClient::new(config).unwrap();
        let text = client
            .complete("Reply with the single word: ready")
            .await
            .unwrap();
        assert!(!text.is_empty());
    }
}
