#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use docqa::{
    AnswerGenerator, Document, DocumentStore, EmbeddingIntent, EmbeddingProvider, IndexedRecord,
    IngestControls, Ingestor, MemoryIndex, QueryControls, QueryPipeline, RetrievedMatch, Throttle,
    VectorIndex,
};

pub const DIMENSIONS: usize = 64;

/// Deterministic bag-of-words embedder. Texts containing `fail_marker` error out.
#[derive(Default)]
pub struct HashingEmbedder {
    pub fail_marker: Option<String>,
    pub fail_all: bool,
    pub delay: Option<Duration>,
    pub document_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
}

impl HashingEmbedder {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.document_calls() + self.query_calls()
    }

    pub fn document_calls(&self) -> usize {
        self.document_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut values = vec![0.0f32; DIMENSIONS];
    for word in text.split_whitespace() {
        let word: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        if word.len() < 3 {
            continue;
        }
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        values[(hasher.finish() % DIMENSIONS as u64) as usize] += 1.0;
    }
    values
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str, intent: EmbeddingIntent) -> Result<Vec<f32>> {
        match intent {
            EmbeddingIntent::Document => self.document_calls.fetch_add(1, Ordering::SeqCst),
            EmbeddingIntent::Query => self.query_calls.fetch_add(1, Ordering::SeqCst),
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_all {
            bail!("embedding service unavailable");
        }
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                bail!("embedding rejected input");
            }
        }
        Ok(bag_of_words(text))
    }

    fn name(&self) -> &'static str {
        "hashing"
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorMode {
    Answer,
    Fail,
    Blank,
}

/// Generator that records the prompts it receives.
pub struct ScriptedGenerator {
    pub mode: GeneratorMode,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(mode: GeneratorMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AnswerGenerator for ScriptedGenerator {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.mode {
            GeneratorMode::Answer => Ok("Generated answer citing the context.".to_string()),
            GeneratorMode::Fail => bail!("completion service returned 503"),
            GeneratorMode::Blank => Ok("   ".to_string()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn support_corpus() -> DocumentStore {
    DocumentStore::new(vec![
        Document::new(
            "doc-x",
            "Trading Hours",
            "The stock market trading hours are Monday through Friday from 9:30 AM until 4:00 PM Eastern.",
            "Trading",
        ),
        Document::new(
            "doc-y",
            "Withdrawal Limits",
            "Daily withdrawal limit is fifty thousand dollars for verified accounts after review.",
            "Payments",
        ),
        Document::new(
            "doc-z",
            "Password Reset",
            "Reset your password from the login page using the emailed reset link within fifteen minutes.",
            "Security",
        ),
    ])
    .expect("valid corpus")
}

pub struct Harness {
    pub store: Arc<DocumentStore>,
    pub embedder: Arc<HashingEmbedder>,
    pub index: Arc<MemoryIndex>,
    pub generator: Arc<ScriptedGenerator>,
    pub ingestor: Arc<Ingestor>,
    pub query: Arc<QueryPipeline>,
}

impl Harness {
    pub fn new(store: DocumentStore, embedder: HashingEmbedder, mode: GeneratorMode) -> Self {
        Self::with_controls(
            store,
            embedder,
            mode,
            IngestControls::default(),
            QueryControls::default(),
        )
    }

    pub fn with_controls(
        store: DocumentStore,
        embedder: HashingEmbedder,
        mode: GeneratorMode,
        ingest: IngestControls,
        query: QueryControls,
    ) -> Self {
        Self::on_index(
            store,
            embedder,
            mode,
            Arc::new(MemoryIndex::new()),
            ingest,
            query,
        )
    }

    pub fn on_index(
        store: DocumentStore,
        embedder: HashingEmbedder,
        mode: GeneratorMode,
        index: Arc<MemoryIndex>,
        ingest: IngestControls,
        query: QueryControls,
    ) -> Self {
        let store = Arc::new(store);
        let embedder = Arc::new(embedder);
        let generator = Arc::new(ScriptedGenerator::new(mode));
        let ingestor = Ingestor::new(
            Arc::clone(&store),
            embedder.clone(),
            index.clone(),
            Throttle::unlimited(),
            ingest,
        );
        let query = QueryPipeline::new(embedder.clone(), index.clone(), generator.clone(), query);
        Self {
            store,
            embedder,
            index,
            generator,
            ingestor: Arc::new(ingestor),
            query: Arc::new(query),
        }
    }
}

/// Index whose upserts always fail; queries find nothing.
#[derive(Default)]
pub struct RejectingIndex {
    pub upsert_calls: AtomicUsize,
}

#[async_trait]
impl VectorIndex for RejectingIndex {
    async fn upsert(&self, _records: &[IndexedRecord]) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        bail!("index is read-only")
    }

    async fn query(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<RetrievedMatch>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _ids: &[String]) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "rejecting"
    }
}

/// Ingestor over `support_corpus` whose upserts always fail.
pub fn rejecting_ingestor() -> (Arc<DocumentStore>, Arc<Ingestor>, Arc<RejectingIndex>) {
    let store = Arc::new(support_corpus());
    let index = Arc::new(RejectingIndex::default());
    let ingestor = Ingestor::new(
        Arc::clone(&store),
        Arc::new(HashingEmbedder::default()),
        index.clone(),
        Throttle::unlimited(),
        IngestControls::default(),
    );
    (store, Arc::new(ingestor), index)
}
