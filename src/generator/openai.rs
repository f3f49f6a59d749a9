//! OpenAI chat-completions answer generator.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{AnswerGenerator, GenerationSettings};
use crate::embedder::normalize_base_url;
use crate::retry::send_with_retry;

/// OpenAI chat-completions backend.
pub struct OpenAiGenerator {
    endpoint: String,
    model: String,
    settings: GenerationSettings,
    client: Client,
    max_retries: usize,
}

impl OpenAiGenerator {
    /// Builds a chat client for `model`.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        settings: GenerationSettings,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build OpenAI HTTP client")?;
        let endpoint = format!(
            "{}/chat/completions",
            normalize_base_url(base_url, "OpenAI")?
        );
        Ok(Self {
            endpoint,
            model,
            settings,
            client,
            max_retries: max_retries.max(1),
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };
        let resp = send_with_retry("OpenAI chat completions", self.max_retries, || {
            self.client.post(&self.endpoint).json(&body)
        })
        .await?;
        let parsed: ChatResponse = resp
            .json()
            .await
            .context("failed to parse OpenAI response")?;
        parsed.into_answer()
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn into_answer(self) -> Result<String> {
        let answer = self
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default();
        if answer.trim().is_empty() {
            bail!("OpenAI response missing message content");
        }
        Ok(answer)
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}
