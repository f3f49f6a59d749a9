//! In-process cosine similarity index for local runs and tests.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::VectorIndex;
use crate::embeddings::{IndexedRecord, RetrievedMatch};

/// Exhaustive-scan index held in memory. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryIndex {
    records: RwLock<BTreeMap<String, IndexedRecord>>,
    max_batch: Option<usize>,
}

impl MemoryIndex {
    /// Empty index accepting batches of any size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty index that rejects upserts larger than `max_batch`.
    pub fn with_max_batch(max_batch: usize) -> Self {
        Self {
            records: RwLock::default(),
            max_batch: Some(max_batch.max(1)),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Fetches a record by id.
    pub async fn get(&self, id: &str) -> Option<IndexedRecord> {
        self.records.read().await.get(id).cloned()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, records: &[IndexedRecord]) -> Result<()> {
        if let Some(limit) = self.max_batch {
            anyhow::ensure!(
                records.len() <= limit,
                "batch of {} exceeds configured max {}",
                records.len(),
                limit
            );
        }
        let mut guard = self.records.write().await;
        for record in records {
            let held = guard
                .values()
                .find(|existing| existing.id != record.id)
                .map(|existing| existing.values.len());
            if let Some(dims) = held {
                anyhow::ensure!(
                    dims == record.values.len(),
                    "vector for {} has {} dimensions, index holds {}",
                    record.id,
                    record.values.len(),
                    dims
                );
            }
            guard.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedMatch>> {
        let guard = self.records.read().await;
        let mut scored: Vec<(f32, &IndexedRecord)> = guard
            .values()
            .map(|record| (cosine_similarity(vector, &record.values), record))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, record)| RetrievedMatch {
                id: record.id.clone(),
                score: Some(score),
                metadata: record.metadata.clone().into(),
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut guard = self.records.write().await;
        for id in ids {
            guard.remove(id);
        }
        Ok(())
    }

    fn max_batch(&self) -> usize {
        self.max_batch.unwrap_or(usize::MAX)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Cosine similarity; zero when either vector has no magnitude or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
