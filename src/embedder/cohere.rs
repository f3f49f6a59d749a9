//! Cohere embed client. Distinguishes document and query input types.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{normalize_base_url, EmbeddingProvider};
use crate::embeddings::EmbeddingIntent;
use crate::retry::send_with_retry;

/// Embeddings client for the Cohere `/embed` endpoint.
#[derive(Clone)]
pub struct CohereEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    max_retries: usize,
}

impl CohereEmbedder {
    /// Builds a new Cohere embeddings client.
    ///
    /// # Arguments
    /// * `api_key` - Bearer token (usually from `COHERE_API_KEY`)
    /// * `base_url` - API root, e.g. `https://api.cohere.com/v1`
    /// * `model` - Model identifier, e.g. `embed-english-v3.0`
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Cohere API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing Cohere model name");
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid Cohere API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Cohere HTTP client")?;
        let endpoint = format!("{}/embed", normalize_base_url(base_url, "Cohere")?);
        Ok(Self {
            client,
            endpoint,
            model,
            max_retries: max_retries.max(1),
        })
    }

    /// Sends a batch of strings with the given intent and returns embedding vectors.
    pub async fn embed_batch(
        &self,
        inputs: &[&str],
        intent: EmbeddingIntent,
    ) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: &self.model,
            texts: inputs,
            input_type: input_type(intent),
        };
        let resp = send_with_retry("Cohere embed", self.max_retries, || {
            self.client.post(&self.endpoint).json(&request)
        })
        .await?;
        let payload: EmbedResponse = resp
            .json()
            .await
            .context("failed to parse Cohere embed response")?;
        payload.into_embeddings(inputs.len())
    }
}

#[async_trait]
impl EmbeddingProvider for CohereEmbedder {
    async fn embed(&self, text: &str, intent: EmbeddingIntent) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text], intent).await?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow!("Cohere returned no embedding"))
    }

    fn name(&self) -> &'static str {
        "cohere"
    }
}

fn input_type(intent: EmbeddingIntent) -> &'static str {
    match intent {
        EmbeddingIntent::Document => "search_document",
        EmbeddingIntent::Query => "search_query",
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: &'a [&'a str],
    input_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Option<EmbeddingPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbeddingPayload {
    Floats(Vec<Vec<f32>>),
    ByType { float: Vec<Vec<f32>> },
}

impl EmbedResponse {
    fn into_embeddings(self, expected_len: usize) -> Result<Vec<Vec<f32>>> {
        let vectors = match self.embeddings {
            Some(EmbeddingPayload::Floats(vectors)) => vectors,
            Some(EmbeddingPayload::ByType { float }) => float,
            None => return Err(anyhow!("Cohere response missing embedding payloads")),
        };
        anyhow::ensure!(
            vectors.len() == expected_len,
            "Cohere returned {} embeddings for {} inputs",
            vectors.len(),
            expected_len
        );
        Ok(vectors)
    }
}
