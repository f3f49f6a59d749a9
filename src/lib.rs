#![warn(missing_docs)]
//! Retrieval-augmented question answering over a small document corpus.
//!
//! Documents are chunked, embedded, and upserted into a vector index by the
//! [`Ingestor`]; questions are embedded, matched, and answered from the retrieved
//! context by the [`QueryPipeline`]. Embedding, indexing, and generation are
//! reached through the [`EmbeddingProvider`], [`VectorIndex`], and
//! [`AnswerGenerator`] traits.

pub mod controls;
pub mod documents;
pub mod embedder;
pub mod embeddings;
pub mod error;
pub mod generator;
pub mod ingest;
pub mod query;
mod retry;
pub mod server;
pub mod telemetry;
pub mod throttle;
pub mod vector_store;

pub use controls::{EmbeddingBackend, GeneratorBackend, IndexBackend, PipelineArgs, Pipelines};
pub use documents::{chunk_corpus, chunk_document, Chunk, Document, DocumentStore};
pub use embedder::EmbeddingProvider;
pub use embeddings::{EmbeddingIntent, IndexedRecord, RetrievedMatch};
pub use error::{RagError, Stage};
pub use generator::AnswerGenerator;
pub use ingest::{IngestControls, IngestReport, Ingestor};
pub use query::{AnswerOutcome, AnswerResult, QueryControls, QueryPipeline, Source};
pub use throttle::{RequestLimiter, Throttle};
pub use vector_store::{IndexName, MemoryIndex, VectorIndex};
