// OpenAI-compatible provider client
// Works against any chat-completions endpoint that speaks the OpenAI wire
// format (OpenAI itself, local gateways, vendor proxies).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{Generation, LlmClient};
use crate::{DispatchError, Result};

/// Configuration for the OpenAI-compatible client.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_ms: u64,
    pub max_tokens: u32,
}

impl Default for OpenAiCompatibleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 30_000,
            max_tokens: 1024,
        }
    }
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiCompatibleClient {
    client: Client,
    config: OpenAiCompatibleConfig,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

impl OpenAiCompatibleClient {
    pub fn new(config: OpenAiCompatibleConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
                .map_err(|e| DispatchError::Internal(format!("invalid API key format: {}", e)))?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn generate(&self, prompt: &str) -> Result<Generation> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            // Low temperature: we want query-shaped text, not creativity
            temperature: 0.1,
            max_tokens: self.config.max_tokens,
        };

        debug!(model = %self.config.model, "sending generation request");

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("LLM request failed: {}", e);
                if e.is_timeout() {
                    DispatchError::UpstreamUnavailable(format!(
                        "provider timed out after {}ms",
                        self.config.timeout_ms
                    ))
                } else {
                    DispatchError::UpstreamUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "LLM provider returned error: {}", body);
            return Err(DispatchError::UpstreamUnavailable(format!(
                "provider returned HTTP {}",
                status
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::UpstreamUnavailable(format!("malformed response: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                DispatchError::UpstreamUnavailable("provider returned no choices".to_string())
            })?;

        Ok(Generation {
            text,
            tokens_used: parsed.usage.map(|u| u.total_tokens),
        })
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }
}
