//! Anthropic Messages API client (https://api.anthropic.com by default).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LlmError, LlmProvider};
use crate::session::{ChatMessage, Role};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const MESSAGES_PATH: &str = "/v1/messages";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    typ: String,
    #[serde(default)]
    text: Option<String>,
}

/// Client for the Anthropic Messages API (and compatible endpoints).
#[derive(Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    /// Full endpoint URL (base + MESSAGES_PATH).
    url: String,
}

impl AnthropicClient {
    /// `timeout` bounds the whole request; a call past it fails as a request error.
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        model: Option<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let url = format!("{}{}", base.trim_end_matches('/'), MESSAGES_PATH);
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens,
            url,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Drop blank turns and anything before the first user turn; the API requires the
/// conversation to open with the user.
fn conversation(messages: &[ChatMessage]) -> Vec<ApiMessage<'_>> {
    messages
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .skip_while(|m| m.role != Role::User)
        .map(|m| ApiMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m.content.as_str(),
        })
        .collect()
}

#[async_trait]
impl LlmProvider for AnthropicClient {
    /// POST /v1/messages (non-streaming); returns the concatenated text blocks.
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = ApiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: conversation(messages),
        };
        let res = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        let data: ApiResponse = res.json().await?;
        let text: String = data
            .content
            .into_iter()
            .filter(|b| b.typ.is_empty() || b.typ == "text")
            .filter_map(|b| b.text)
            .collect();
        Ok(text)
    }
}
