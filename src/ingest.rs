//! Document ingestion: chunk, embed, and upsert the corpus into the vector index.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::documents::{chunk_id, Chunk, DocumentStore, DEFAULT_CHUNK_SIZE};
use crate::embedder::EmbeddingProvider;
use crate::embeddings::{EmbeddingIntent, IndexedRecord, DEFAULT_METADATA_TEXT_CAP};
use crate::error::{RagError, Stage};
use crate::throttle::{with_deadline, Throttle};
use crate::vector_store::VectorIndex;

/// Knobs that bound an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestControls {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Characters of chunk text kept in index metadata.
    pub metadata_text_cap: usize,
    /// Deadline for each embedding or upsert call.
    pub call_timeout: Duration,
    /// Stale chunk ids deleted past each document's last chunk (0 disables).
    pub prune_window: usize,
}

impl Default for IngestControls {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            metadata_text_cap: DEFAULT_METADATA_TEXT_CAP,
            call_timeout: Duration::from_secs(30),
            prune_window: 0,
        }
    }
}

/// A chunk that could not be embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFailure {
    /// Offending chunk id.
    pub chunk_id: String,
    /// Error message.
    pub error: String,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Records upserted.
    pub indexed_count: usize,
    /// Chunks attempted.
    pub total_count: usize,
    /// Documents in the corpus.
    pub document_count: usize,
    /// Per-chunk failures in corpus order.
    pub failures: Vec<ChunkFailure>,
    /// Stale ids submitted for deletion.
    pub pruned_count: usize,
}

impl IngestReport {
    /// Chunks that failed to embed.
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// Operator-facing summary line.
    pub fn message(&self) -> String {
        format!(
            "Successfully indexed {} out of {} chunks from {} documents",
            self.indexed_count, self.total_count, self.document_count
        )
    }
}

/// Accumulator folded over per-chunk embedding outcomes.
#[derive(Default)]
struct IngestOutcome {
    records: Vec<IndexedRecord>,
    failures: Vec<ChunkFailure>,
    dimensions: Option<usize>,
}

impl IngestOutcome {
    fn absorb(
        mut self,
        chunk: &Chunk,
        result: Result<Vec<f32>, RagError>,
        text_cap: usize,
    ) -> Self {
        let checked = result.and_then(|values| self.check_dimensions(values));
        match checked {
            Ok(values) => {
                self.dimensions.get_or_insert(values.len());
                self.records
                    .push(IndexedRecord::from_chunk(chunk, values, text_cap));
            }
            Err(err) => {
                warn!(chunk_id = %chunk.chunk_id, error = %err, "failed to embed chunk");
                self.failures.push(ChunkFailure {
                    chunk_id: chunk.chunk_id.clone(),
                    error: err.to_string(),
                });
            }
        }
        self
    }

    fn check_dimensions(&self, values: Vec<f32>) -> Result<Vec<f32>, RagError> {
        if values.is_empty() {
            return Err(RagError::provider(
                Stage::Embedding,
                anyhow::anyhow!("provider returned an empty vector"),
            ));
        }
        match self.dimensions {
            Some(expected) if expected != values.len() => Err(RagError::provider(
                Stage::Embedding,
                anyhow::anyhow!(
                    "provider returned {} dimensions, expected {}",
                    values.len(),
                    expected
                ),
            )),
            _ => Ok(values),
        }
    }
}

/// Chunks the corpus, embeds every chunk, and upserts the vectors.
pub struct Ingestor {
    store: Arc<DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    throttle: Throttle,
    controls: IngestControls,
}

impl Ingestor {
    /// Wires an ingestor from explicit collaborators.
    pub fn new(
        store: Arc<DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        throttle: Throttle,
        controls: IngestControls,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
            throttle,
            controls,
        }
    }

    /// Runs one full ingestion pass.
    ///
    /// A chunk that fails to embed is recorded and skipped. The run fails only when no
    /// chunk produced a vector or when the upsert itself fails.
    pub async fn ingest(&self) -> Result<IngestReport, RagError> {
        let chunks = self.store.chunks(self.controls.chunk_size);
        let total = chunks.len();
        info!(
            chunks = total,
            documents = self.store.len(),
            provider = self.embedder.name(),
            "processing chunks"
        );

        let mut outcomes = Vec::with_capacity(total);
        for (position, chunk) in chunks.iter().enumerate() {
            self.throttle.ready().await;
            info!(chunk_id = %chunk.chunk_id, "[{}/{}] embedding chunk", position + 1, total);
            let result = with_deadline(
                Stage::Embedding,
                self.controls.call_timeout,
                self.embedder.embed(&chunk.text, EmbeddingIntent::Document),
            )
            .await;
            outcomes.push(result);
        }

        let text_cap = self.controls.metadata_text_cap;
        let outcome = chunks
            .iter()
            .zip(outcomes)
            .fold(IngestOutcome::default(), |acc, (chunk, result)| {
                acc.absorb(chunk, result, text_cap)
            });

        info!(
            total,
            succeeded = outcome.records.len(),
            failed = outcome.failures.len(),
            "embedding summary"
        );
        if outcome.records.is_empty() {
            return Err(RagError::EmptyResult { attempted: total });
        }

        self.upsert_all(&outcome.records).await?;
        let pruned_count = self.prune_orphans(&chunks).await;

        let report = IngestReport {
            indexed_count: outcome.records.len(),
            total_count: total,
            document_count: self.store.len(),
            failures: outcome.failures,
            pruned_count,
        };
        info!("{}", report.message());
        Ok(report)
    }

    async fn upsert_all(&self, records: &[IndexedRecord]) -> Result<(), RagError> {
        let batch = self.index.max_batch().max(1);
        info!(
            vectors = records.len(),
            index = self.index.name(),
            batch,
            "upserting vectors"
        );
        for slice in records.chunks(batch) {
            with_deadline(
                Stage::Index,
                self.controls.call_timeout,
                self.index.upsert(slice),
            )
            .await?;
        }
        Ok(())
    }

    async fn prune_orphans(&self, chunks: &[Chunk]) -> usize {
        let window = self.controls.prune_window;
        if window == 0 {
            return 0;
        }
        let stale = stale_chunk_ids(&self.store, chunks, window);
        if stale.is_empty() {
            return 0;
        }
        let result = with_deadline(
            Stage::Index,
            self.controls.call_timeout,
            self.index.delete(&stale),
        )
        .await;
        match result {
            Ok(()) => stale.len(),
            Err(err) => {
                warn!(error = %err, "failed to prune stale chunk ids");
                0
            }
        }
    }
}

/// Ids past each document's current last chunk, up to `window` per document.
fn stale_chunk_ids(store: &DocumentStore, chunks: &[Chunk], window: usize) -> Vec<String> {
    store
        .documents()
        .iter()
        .flat_map(|doc| {
            let current = chunks
                .iter()
                .filter(|chunk| chunk.document_id == doc.id)
                .count();
            (current..current + window).map(move |idx| chunk_id(&doc.id, idx))
        })
        .collect()
}
