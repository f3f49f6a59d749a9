//! Answer generator capability and the completion backends behind it.

use anyhow::Result;
use async_trait::async_trait;

mod anthropic;
mod openai;

pub use anthropic::AnthropicGenerator;
pub use openai::OpenAiGenerator;

/// Trait implemented by concrete completion providers.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Completes `prompt` under the given system instruction.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;

    /// Provider label for logs.
    fn name(&self) -> &'static str;
}

/// Sampling settings shared by the various providers.
#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token ceiling.
    pub max_tokens: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}
