use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::conversation::ConversationTurn;
use crate::prompt::InvokeRequest;

/// Response-cost tier: full-capability answers vs. the cheaper model
/// used for introductions and context-only turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTier {
    Standard,
    CostEfficient,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
}

/// Single-call inference collaborator.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn invoke(&self, tier: ResponseTier, request: &InvokeRequest) -> Result<Completion>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ConversationTurn],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ResponseBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

/// HTTP client for an Anthropic-Messages-style completion endpoint.
pub struct AnthropicClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl AnthropicClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn model_for(&self, tier: ResponseTier) -> &str {
        match tier {
            ResponseTier::Standard => &self.config.standard.model,
            ResponseTier::CostEfficient => &self.config.cost_efficient.model,
        }
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn invoke(&self, tier: ResponseTier, request: &InvokeRequest) -> Result<Completion> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let body = MessagesRequest {
            model: self.model_for(tier),
            max_tokens: request.max_tokens,
            system: &request.system,
            messages: &request.messages,
        };

        debug!("Sending completion request to {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion API error ({}): {}", status, error_body);
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        Ok(Completion {
            text: join_text_blocks(&parsed.content),
            usage: parsed.usage,
            stop_reason: parsed.stop_reason,
        })
    }
}

/// The reply string is the space-joined, trimmed concatenation of the
/// response's text blocks.
fn join_text_blocks(blocks: &[ResponseBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(text.as_str()),
            ResponseBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}
