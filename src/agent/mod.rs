pub mod prompt;

use anyhow::{anyhow, Context, Error};
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

use crate::config::AppConfig;
use crate::pipeline::{Backend, GenerationRequest};

use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::gemini;

const ACTIVATION_PROMPT: &str = "hi";

/// A Gemini model that answered an activation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiModel {
    pub name: String,
}

pub struct GeminiBackend {
    client: gemini::Client,
    http: reqwest::Client,
    base_url: String,
    activation_max_tokens: u64,
}

impl GeminiBackend {
    pub fn new(config: &AppConfig) -> Result<Self, Error> {
        let client = gemini::Client::new(&config.gemini_api_key)
            .context("Failed to build Gemini client")?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(config.gemini_api_key.trim())
            .context("Invalid GEMINI_API_KEY for x-goog-api-key header")?;
        headers.insert("x-goog-api-key", key);
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.call_timeout().max(Duration::from_secs(1)))
            .build()
            .context("Failed to build Gemini HTTP client")?;

        Ok(Self {
            client,
            http,
            base_url: config.gemini_base_url().trim_end_matches('/').to_string(),
            activation_max_tokens: config.activation_max_tokens.unwrap_or(1),
        })
    }
}

impl Backend for GeminiBackend {
    type Handle = GeminiModel;

    /// Any successful `generateContent` round-trip activates the model. The
    /// body is not inspected: with a tiny output budget thinking models stop
    /// at `MAX_TOKENS` without any visible parts.
    async fn activate(&self, candidate: &str) -> Result<GeminiModel, Error> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, candidate
        );
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "contents": [
                    {"role": "user", "parts": [{"text": ACTIVATION_PROMPT}]}
                ],
                "generationConfig": {"maxOutputTokens": self.activation_max_tokens}
            }))
            .send()
            .await
            .with_context(|| format!("Activation request to {} failed", candidate))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error (status {}): {}", status, body));
        }

        Ok(GeminiModel {
            name: candidate.to_string(),
        })
    }

    async fn generate(
        &self,
        handle: &GeminiModel,
        request: &GenerationRequest,
    ) -> Result<String, Error> {
        let agent = self
            .client
            .agent(&handle.name)
            .preamble(&request.preamble)
            .build();
        log::info!("sending prompt to {}", handle.name);
        agent
            .prompt(request.prompt.as_str())
            .await
            .with_context(|| format!("Generation request to {} failed", handle.name))
    }
}
