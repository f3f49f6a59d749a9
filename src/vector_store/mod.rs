//! Vector index capability plus the Pinecone and in-memory backends.

use anyhow::Result;
use async_trait::async_trait;

use crate::embeddings::{IndexedRecord, RetrievedMatch};

pub mod memory;
pub mod pinecone;

pub use memory::MemoryIndex;
pub use pinecone::PineconeIndex;

/// Default index name when none is configured.
pub const DEFAULT_INDEX_NAME: &str = "knowledge-base";

/// Key-value store of vectors supporting upsert and nearest-neighbour query.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or overwrites records by id.
    async fn upsert(&self, records: &[IndexedRecord]) -> Result<()>;

    /// Returns up to `top_k` records ordered by descending similarity.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedMatch>>;

    /// Removes records by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Largest number of records accepted by one upsert call.
    fn max_batch(&self) -> usize {
        100
    }

    /// Backend label for logs.
    fn name(&self) -> &str;
}

/// Validated index name (lowercase alphanumerics and hyphens, at most 45 characters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexName(String);

impl IndexName {
    /// Builds a new index identifier.
    pub fn new<S: Into<String>>(name: S) -> Result<Self> {
        let name = name.into();
        let trimmed = name.trim();
        anyhow::ensure!(!trimmed.is_empty(), "index name is required");
        anyhow::ensure!(
            trimmed.len() <= 45,
            "index name {trimmed:?} exceeds 45 characters"
        );
        anyhow::ensure!(
            trimmed
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-'),
            "index name {trimmed:?} may only contain lowercase letters, digits and '-'"
        );
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
