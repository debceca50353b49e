//! OpenAI-compatible chat-completions client.
//!
//! Talks to `POST {api_base}/chat/completions` with bearer auth, which covers
//! hosted providers as well as a LiteLLM proxy in front of them.

use super::{Completion, CompletionClient, CompletionRequest, LlmError, TokenUsage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// HTTP client for a chat-completions endpoint.
pub struct ChatCompletionsClient {
    http_client: reqwest::Client,
    api_base: String,
    api_key: String,
    timeout_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageBlock>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<UsageBlock> for TokenUsage {
    fn from(block: UsageBlock) -> Self {
        let total = if block.total_tokens == 0 {
            block.prompt_tokens + block.completion_tokens
        } else {
            block.total_tokens
        };
        Self {
            prompt_tokens: block.prompt_tokens,
            completion_tokens: block.completion_tokens,
            total_tokens: total,
        }
    }
}

impl ChatCompletionsClient {
    pub fn new(api_base: &str, api_key: &str, timeout_seconds: u64) -> Result<Self> {
        info!("Using completion endpoint {}", api_base);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout_seconds,
        })
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionsClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let url = format!("{}/chat/completions", self.api_base);

        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_seconds)
                } else if e.is_connect() {
                    LlmError::Connect(self.api_base.clone())
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let text = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }

        debug!("Received {} characters of completion text", text.len());

        Ok(Completion {
            text,
            usage: chat_response.usage.map(TokenUsage::from),
        })
    }
}
