//! OpenAI-compatible model implementation
//!
//! Works with OpenAI, Azure OpenAI, vLLM, Ollama, and other OpenAI-compatible APIs.

use super::Model;
use chatedit_runtime::{Error, ErrorKind, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Configuration for an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    /// Sent ahead of the transcript when set
    pub system_prompt: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            temperature: Some(0.0),
            max_tokens: None,
            system_prompt: None,
            headers: HashMap::new(),
            timeout_secs: Some(120),
        }
    }
}

impl ModelConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// OpenAI-compatible chat completion model
pub struct OpenAiModel {
    client: Client,
    config: ModelConfig,
}

impl OpenAiModel {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.unwrap_or(120)))
            .build()
            .map_err(|e| {
                Error::new(ErrorKind::ProviderUnavailable, "failed to create HTTP client")
                    .with_operation("OpenAiModel::new")
                    .set_source(e)
            })?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
    }

    fn messages(&self, transcript: &[String]) -> Vec<OpenAiMessage> {
        let system = self.config.system_prompt.iter().map(|prompt| OpenAiMessage {
            role: "system".into(),
            content: Some(prompt.clone()),
        });
        let turns = transcript.iter().enumerate().map(|(i, text)| OpenAiMessage {
            role: if i % 2 == 0 { "user" } else { "assistant" }.into(),
            content: Some(text.clone()),
        });
        system.chain(turns).collect()
    }
}

impl Model for OpenAiModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, transcript: &[String]) -> Result<String> {
        let request = OpenAiRequest {
            model: self.config.model.clone(),
            messages: self.messages(transcript),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: Some(false),
        };
        debug!(model = %self.config.model, turns = transcript.len(), "sending completion request");

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url()))
            .json(&request);

        if let Some(api_key) = &self.config.api_key {
            if !api_key.is_empty() {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
        }

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req.send().await.map_err(|e| {
            Error::new(ErrorKind::NetworkFailed, format!("request failed: {}", e))
                .with_operation("OpenAiModel::generate")
                .temporary()
                .set_source(e)
        })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = match status {
                429 => Error::new(ErrorKind::RateLimited, "rate limited").temporary(),
                401 | 403 => Error::new(ErrorKind::AuthenticationFailed, "authentication failed"),
                _ => Error::inference_failed(format!("API error ({}): {}", status, text)),
            };
            return Err(err
                .with_operation("OpenAiModel::generate")
                .with_context("status", status.to_string()));
        }

        let api_response: OpenAiResponse = response.json().await.map_err(|e| {
            Error::new(ErrorKind::SerializationFailed, format!("invalid response: {}", e))
                .with_operation("OpenAiModel::generate")
                .set_source(e)
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::inference_failed("no choices in response"))?;
        if let Some(usage) = api_response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion received"
            );
        }
        choice
            .message
            .content
            .ok_or_else(|| Error::inference_failed("no content in response"))
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}
