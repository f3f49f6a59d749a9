//! Anthropic messages answer generator.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{AnswerGenerator, GenerationSettings};
use crate::retry::send_with_retry;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic messages backend.
pub struct AnthropicGenerator {
    model: String,
    settings: GenerationSettings,
    client: Client,
    max_retries: usize,
}

impl AnthropicGenerator {
    /// Builds a messages client for `model`.
    pub fn new(
        api_key: &str,
        model: String,
        settings: GenerationSettings,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Anthropic API key");
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key.trim()).context("invalid Anthropic API key")?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Anthropic HTTP client")?;
        Ok(Self {
            model,
            settings,
            client,
            max_retries: max_retries.max(1),
        })
    }
}

#[async_trait]
impl AnswerGenerator for AnthropicGenerator {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: vec![AnthropicContentBlock {
                    kind: "text",
                    text: prompt,
                }],
            }],
        };
        let resp = send_with_retry("Anthropic messages", self.max_retries, || {
            self.client.post(MESSAGES_URL).json(&body)
        })
        .await?;
        let parsed: AnthropicResponse = resp
            .json()
            .await
            .context("failed to parse Anthropic response")?;
        parsed.into_answer()
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<AnthropicContentBlock<'a>>,
}

#[derive(Serialize)]
struct AnthropicContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

impl AnthropicResponse {
    fn into_answer(self) -> Result<String> {
        let answer = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(text),
                AnthropicResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if answer.trim().is_empty() {
            bail!("Anthropic response missing text content");
        }
        Ok(answer)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}
