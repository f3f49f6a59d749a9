//! Shared embedding and index record types used across pipeline stages.

use serde::{Deserialize, Serialize};

use crate::documents::Chunk;

/// Default cap on the chunk text stored as index metadata.
pub const DEFAULT_METADATA_TEXT_CAP: usize = 1000;

/// Purpose of an embedding request. Providers may embed the same text differently per intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingIntent {
    /// Text stored in the index.
    Document,
    /// Text used to search the index.
    Query,
}

/// Metadata stored next to every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// Chunk text, possibly truncated.
    pub text: String,
    /// Source document title.
    pub title: String,
    /// Source document category.
    pub category: String,
    /// Source document id.
    pub document_id: String,
    /// Chunk position within the document.
    pub chunk_index: usize,
}

/// Row upserted into a vector index, keyed by chunk id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    /// Chunk id.
    pub id: String,
    /// Embedding vector.
    pub values: Vec<f32>,
    /// Retrieval metadata.
    pub metadata: RecordMetadata,
}

impl IndexedRecord {
    /// Builds a record for an embedded chunk, truncating the stored text to `text_cap` characters.
    pub fn from_chunk(chunk: &Chunk, values: Vec<f32>, text_cap: usize) -> Self {
        Self {
            id: chunk.chunk_id.clone(),
            values,
            metadata: RecordMetadata {
                text: truncate_chars(&chunk.text, text_cap).to_string(),
                title: chunk.title.clone(),
                category: chunk.category.clone(),
                document_id: chunk.document_id.clone(),
                chunk_index: chunk.chunk_index,
            },
        }
    }
}

/// Metadata as returned by an index query. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    /// Stored chunk text.
    #[serde(default)]
    pub text: Option<String>,
    /// Source title.
    #[serde(default)]
    pub title: Option<String>,
    /// Source category.
    #[serde(default)]
    pub category: Option<String>,
    /// Source document id.
    #[serde(default)]
    pub document_id: Option<String>,
    /// Chunk position; Pinecone hands numbers back as floats.
    #[serde(default)]
    pub chunk_index: Option<f64>,
}

impl From<RecordMetadata> for MatchMetadata {
    fn from(meta: RecordMetadata) -> Self {
        Self {
            text: Some(meta.text),
            title: Some(meta.title),
            category: Some(meta.category),
            document_id: Some(meta.document_id),
            chunk_index: Some(meta.chunk_index as f64),
        }
    }
}

/// Nearest-neighbour hit, ordered by descending score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedMatch {
    /// Chunk id.
    pub id: String,
    /// Similarity, higher is more relevant.
    #[serde(default)]
    pub score: Option<f32>,
    /// Whatever metadata the index returned.
    #[serde(default)]
    pub metadata: MatchMetadata,
}

/// Returns at most `cap` characters of `text` without splitting a code point.
pub fn truncate_chars(text: &str, cap: usize) -> &str {
    match text.char_indices().nth(cap) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
