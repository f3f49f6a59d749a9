//! Question answering: embed, retrieve, ground, generate.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::embedder::EmbeddingProvider;
use crate::embeddings::{truncate_chars, EmbeddingIntent, RetrievedMatch};
use crate::error::{RagError, Stage};
use crate::generator::AnswerGenerator;
use crate::throttle::with_deadline;
use crate::vector_store::VectorIndex;

/// Answer returned when retrieval finds nothing.
pub const NO_INFORMATION_ANSWER: &str =
    "I couldn't find any relevant information in my knowledge base.";

/// Sources rendered next to an answer in the chat transcript.
pub const DISPLAY_SOURCE_LIMIT: usize = 3;

const SYSTEM_INSTRUCTION: &str = "You are a helpful customer service assistant for a fintech trading platform.
Answer questions based ONLY on the provided context.
Always cite your sources by mentioning the document title.
If the answer is not in the context, say \"I don't have information about that in my knowledge base.\"
Be concise but helpful.";

const CONTEXT_DELIMITER: &str = "\n\n---\n\n";
const FALLBACK_SNIPPET_CHARS: usize = 600;

/// Retrieval and prompt-size knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryControls {
    /// Nearest neighbours requested from the index.
    pub top_k: usize,
    /// Matches placed into the generator context.
    pub context_limit: usize,
    /// Optional character cap applied to the question before embedding.
    pub query_text_cap: Option<usize>,
    /// Deadline for each embedding, index, or generation call.
    pub call_timeout: Duration,
    /// Cached query embeddings (0 disables caching).
    pub embedding_cache_size: usize,
}

impl Default for QueryControls {
    fn default() -> Self {
        Self {
            top_k: 5,
            context_limit: 3,
            query_text_cap: None,
            call_timeout: Duration::from_secs(30),
            embedding_cache_size: 256,
        }
    }
}

/// Citation attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    /// Document title, `"Unknown"` when absent.
    pub title: String,
    /// Document category, `"General"` when absent.
    pub category: String,
    /// Similarity score, `0` when absent.
    pub score: f32,
    /// Stored chunk text, empty when absent.
    pub text: String,
}

impl From<&RetrievedMatch> for Source {
    fn from(hit: &RetrievedMatch) -> Self {
        Self {
            title: hit
                .metadata
                .title
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            category: hit
                .metadata
                .category
                .clone()
                .unwrap_or_else(|| "General".to_string()),
            score: hit.score.unwrap_or(0.0),
            text: hit.metadata.text.clone().unwrap_or_default(),
        }
    }
}

/// How an answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// The generator answered from retrieved context.
    Generated,
    /// Retrieval returned nothing; canned answer.
    NoMatches,
    /// The generator failed; templated answer from the top passage.
    Fallback,
}

/// Answer plus ranked sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    /// Natural-language answer.
    pub answer: String,
    /// Every retrieved match in rank order.
    pub sources: Vec<Source>,
    /// How the answer was produced.
    #[serde(skip)]
    pub outcome: AnswerOutcome,
}

impl AnswerResult {
    /// The sources a chat transcript renders.
    pub fn display_sources(&self) -> &[Source] {
        let end = self.sources.len().min(DISPLAY_SOURCE_LIMIT);
        &self.sources[..end]
    }
}

/// Answers questions against the vector index.
pub struct QueryPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn AnswerGenerator>,
    controls: QueryControls,
    embedding_cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl QueryPipeline {
    /// Wires a pipeline from explicit collaborators.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn AnswerGenerator>,
        controls: QueryControls,
    ) -> Self {
        let embedding_cache = NonZeroUsize::new(controls.embedding_cache_size)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self {
            embedder,
            index,
            generator,
            controls,
            embedding_cache,
        }
    }

    /// Answers `question` from the indexed corpus.
    ///
    /// Fails only on blank input or when retrieval itself fails; a generator failure
    /// degrades to a templated answer built from the best passage.
    pub async fn answer_query(&self, question: &str) -> Result<AnswerResult, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Validation("Query is required".to_string()));
        }
        let question = match self.controls.query_text_cap {
            Some(cap) => truncate_chars(question, cap),
            None => question,
        };

        let embedding = self.embed_question(question).await?;
        let matches = with_deadline(
            Stage::Index,
            self.controls.call_timeout,
            self.index.query(&embedding, self.controls.top_k.max(1)),
        )
        .await?;
        info!(matches = matches.len(), index = self.index.name(), "retrieved matches");

        if matches.is_empty() {
            return Ok(AnswerResult {
                answer: NO_INFORMATION_ANSWER.to_string(),
                sources: Vec::new(),
                outcome: AnswerOutcome::NoMatches,
            });
        }

        let sources: Vec<Source> = matches.iter().map(Source::from).collect();
        let context = build_context(&sources, self.controls.context_limit);
        let prompt = build_prompt(question, &context);

        let generated = with_deadline(
            Stage::Generation,
            self.controls.call_timeout,
            self.generator.complete(SYSTEM_INSTRUCTION, &prompt),
        )
        .await;
        let (answer, outcome) = match generated {
            Ok(answer) if !answer.trim().is_empty() => (answer, AnswerOutcome::Generated),
            Ok(_) => {
                warn!(generator = self.generator.name(), "generator returned a blank answer");
                (fallback_answer(&sources), AnswerOutcome::Fallback)
            }
            Err(err) => {
                warn!(generator = self.generator.name(), error = %err, "answer generation failed");
                (fallback_answer(&sources), AnswerOutcome::Fallback)
            }
        };
        Ok(AnswerResult {
            answer,
            sources,
            outcome,
        })
    }

    async fn embed_question(&self, question: &str) -> Result<Vec<f32>, RagError> {
        if let Some(cache) = &self.embedding_cache {
            let hit = {
                let mut guard = cache.lock().await;
                guard.get(question).cloned()
            };
            if let Some(hit) = hit {
                debug!("query embedding cache hit");
                return Ok(hit);
            }
        }

        let embedding = with_deadline(
            Stage::Embedding,
            self.controls.call_timeout,
            self.embedder.embed(question, EmbeddingIntent::Query),
        )
        .await?;
        if embedding.is_empty() {
            return Err(RagError::provider(
                Stage::Embedding,
                anyhow::anyhow!("{} returned an empty query vector", self.embedder.name()),
            ));
        }

        if let Some(cache) = &self.embedding_cache {
            let mut guard = cache.lock().await;
            guard.put(question.to_string(), embedding.clone());
        }
        Ok(embedding)
    }
}

/// Renders the top `limit` non-empty passages with their titles.
fn build_context(sources: &[Source], limit: usize) -> String {
    sources
        .iter()
        .filter(|source| !source.text.trim().is_empty())
        .take(limit.max(1))
        .map(|source| format!("[Source: {}]\n{}", source.title, source.text.trim()))
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

fn build_prompt(question: &str, context: &str) -> String {
    format!("Context:\n{context}\n\nQuestion: {question}\n\nAnswer:")
}

/// Templated answer quoting the best passage when generation is unavailable.
fn fallback_answer(sources: &[Source]) -> String {
    let Some(top) = sources.first() else {
        return NO_INFORMATION_ANSWER.to_string();
    };
    let passage = strip_title(&top.text, &top.title);
    if passage.is_empty() {
        return format!(
            "I couldn't generate a full answer right now. The most relevant document appears to be \"{}\"; see the sources below.",
            top.title
        );
    }
    let snippet = truncate_chars(passage, FALLBACK_SNIPPET_CHARS);
    let ellipsis = if snippet.len() < passage.len() { "..." } else { "" };
    format!(
        "I couldn't generate a full answer right now, but here is the most relevant passage from \"{}\":\n\n{}{}",
        top.title, snippet, ellipsis
    )
}

fn strip_title<'a>(text: &'a str, title: &str) -> &'a str {
    text.trim()
        .strip_prefix(title)
        .map(str::trim_start)
        .unwrap_or_else(|| text.trim())
}
