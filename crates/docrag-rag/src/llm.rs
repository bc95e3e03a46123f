//! xAI chat-completions transport.
//!
//! Pure transport: one POST per call, no retries, no retrieval logic.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use docrag_core::config::LlmConfig;
use docrag_core::error::Error;
use docrag_core::traits::ChatModel;
use docrag_core::types::ChatMessage;

#[derive(Debug, Clone)]
pub struct XaiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl XaiConfig {
    /// Reads `XAI_API_KEY` and `XAI_MODEL`; either missing is a configuration error.
    pub fn from_env(llm: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("XAI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig("Missing XAI_API_KEY env var".into()))?;
        let model = std::env::var("XAI_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidConfig("Missing XAI_MODEL env var (set to an allowed Grok model id)".into())
            })?;
        Ok(Self {
            api_key,
            model,
            base_url: llm.base_url.clone(),
            temperature: llm.temperature,
            timeout: Duration::from_secs(llm.timeout_secs),
        })
    }
}

pub struct XaiClient {
    config: XaiConfig,
    client: Client,
}

impl XaiClient {
    pub fn new(config: XaiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build xAI HTTP client")?;
        Ok(Self { config, client })
    }

    pub fn from_env(llm: &LlmConfig) -> Result<Self> {
        Self::new(XaiConfig::from_env(llm)?)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

impl ChatModel for XaiClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.config.api_key.trim());
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth).context("invalid xAI API key")?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
        };
        debug!(model = self.config.model.as_str(), messages = messages.len(), "chat completion request");
        let resp = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&body)
            .send()
            .context("failed to call xAI chat completions")?;
        let status = resp.status();
        if status.is_client_error() || status.is_server_error() {
            let body = resp.text().unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Transport { status: status.as_u16(), body }.into());
        }
        let parsed: ChatResponse = resp.json().context("failed to parse xAI response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Operation("xAI response has no choices".into()).into())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}
