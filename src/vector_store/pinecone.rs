//! Pinecone data-plane client.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{IndexName, VectorIndex};
use crate::embeddings::{IndexedRecord, RetrievedMatch};
use crate::retry::send_with_retry;

const CONTROL_PLANE: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

/// REST client bound to one Pinecone index host.
#[derive(Clone)]
pub struct PineconeIndex {
    client: Client,
    host: String,
    name: IndexName,
    namespace: Option<String>,
    max_batch: usize,
    max_retries: usize,
}

impl PineconeIndex {
    /// Connects to an index, resolving its data-plane host through the control plane
    /// unless `host` is supplied. Every request retries 429/5xx up to `max_retries` attempts.
    pub async fn connect(
        api_key: &str,
        name: IndexName,
        host: Option<String>,
        namespace: Option<String>,
        timeout: Duration,
        max_batch: usize,
        max_retries: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Pinecone API key");
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key.trim()).context("invalid Pinecone API key")?,
        );
        headers.insert(
            "x-pinecone-api-version",
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Pinecone HTTP client")?;

        let host = match host.filter(|h| !h.trim().is_empty()) {
            Some(host) => host,
            None => describe_host(&client, &name, max_retries).await?,
        };
        let host = normalize_host(&host);
        info!(index = name.as_str(), %host, "connected to Pinecone index");
        Ok(Self {
            client,
            host,
            name,
            namespace: namespace.filter(|ns| !ns.trim().is_empty()),
            max_batch: max_batch.max(1),
            max_retries: max_retries.max(1),
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B, action: &str) -> Result<Response> {
        let url = format!("{}{}", self.host, path);
        send_with_retry(&format!("Pinecone {action}"), self.max_retries, || {
            self.client.post(&url).json(body)
        })
        .await
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[IndexedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        anyhow::ensure!(
            records.len() <= self.max_batch,
            "batch of {} exceeds configured max {}",
            records.len(),
            self.max_batch
        );
        let body = UpsertRequest {
            vectors: records,
            namespace: self.namespace.as_deref(),
        };
        let resp = self.post("/vectors/upsert", &body, "upsert").await?;
        let parsed: UpsertResponse = resp
            .json()
            .await
            .context("failed to parse Pinecone upsert response")?;
        debug!(upserted = parsed.upserted_count, "Pinecone upsert complete");
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedMatch>> {
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };
        let resp = self.post("/query", &body, "query").await?;
        let parsed: QueryResponse = resp
            .json()
            .await
            .context("failed to parse Pinecone query response")?;
        Ok(parsed.matches)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = DeleteRequest {
            ids,
            namespace: self.namespace.as_deref(),
        };
        self.post("/vectors/delete", &body, "delete").await?;
        Ok(())
    }

    fn max_batch(&self) -> usize {
        self.max_batch
    }

    fn name(&self) -> &str {
        self.name.as_str()
    }
}

async fn describe_host(client: &Client, name: &IndexName, max_retries: usize) -> Result<String> {
    let url = format!("{CONTROL_PLANE}/indexes/{}", name.as_str());
    let resp = send_with_retry("Pinecone describe index", max_retries, || client.get(&url))
        .await
        .with_context(|| format!("failed to describe Pinecone index {}", name.as_str()))?;
    let parsed: DescribeIndexResponse = resp
        .json()
        .await
        .context("failed to parse Pinecone describe-index response")?;
    parsed
        .host
        .filter(|host| !host.is_empty())
        .ok_or_else(|| anyhow!("Pinecone index {} has no host yet", name.as_str()))
}

fn normalize_host(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexedRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RetrievedMatch>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DescribeIndexResponse {
    #[serde(default)]
    host: Option<String>,
}
