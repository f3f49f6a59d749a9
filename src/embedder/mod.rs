//! Embedding provider capability and its HTTP-backed implementations.

use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

use crate::embeddings::EmbeddingIntent;

pub mod cohere;
pub mod openai;

pub use cohere::CohereEmbedder;
pub use openai::OpenAiEmbedder;

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds one text for the given intent.
    async fn embed(&self, text: &str, intent: EmbeddingIntent) -> Result<Vec<f32>>;

    /// Provider label for logs.
    fn name(&self) -> &'static str;
}

/// Validates an http(s) base URL and strips the trailing slash.
pub(crate) fn normalize_base_url(raw: &str, provider: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim())
        .with_context(|| format!("invalid {provider} base URL {raw:?}"))?;
    anyhow::ensure!(
        matches!(parsed.scheme(), "http" | "https"),
        "{provider} base URL must be an http(s) URL"
    );
    Ok(raw.trim().trim_end_matches('/').to_string())
}
