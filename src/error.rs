//! Error taxonomy surfaced by the ingestion and query pipelines.

use std::fmt;

use thiserror::Error;

/// External collaborator a failed call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Embedding provider call.
    Embedding,
    /// Vector index upsert, query or delete.
    Index,
    /// Answer generator completion.
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Embedding => "embedding",
            Stage::Index => "vector index",
            Stage::Generation => "generation",
        };
        f.write_str(label)
    }
}

/// Errors returned by the pipelines and the binaries that wire them up.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing credentials or unusable settings. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Rejected user input.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A collaborator call failed.
    #[error("{stage} call failed: {source:#}")]
    Provider {
        /// Which collaborator failed.
        stage: Stage,
        /// Underlying client error.
        #[source]
        source: anyhow::Error,
    },

    /// A collaborator call exceeded its deadline.
    #[error("{stage} call timed out after {after_ms} ms")]
    Timeout {
        /// Which collaborator timed out.
        stage: Stage,
        /// Deadline that expired.
        after_ms: u64,
    },

    /// Ingestion produced no vectors at all.
    #[error("no vectors were generated; all {attempted} chunk embeddings failed")]
    EmptyResult {
        /// Number of chunks attempted.
        attempted: usize,
    },
}

impl RagError {
    /// Wraps a client error for the given stage.
    pub fn provider(stage: Stage, source: anyhow::Error) -> Self {
        RagError::Provider { stage, source }
    }

    /// True when retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Timeout { .. })
    }

    /// Stage of the failing collaborator, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RagError::Provider { stage, .. } | RagError::Timeout { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
