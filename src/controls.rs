//! Provider selection, credentials, and pipeline knobs shared by the binaries.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use tracing::info;

use crate::documents::{DocumentStore, DEFAULT_CHUNK_SIZE};
use crate::embedder::{CohereEmbedder, EmbeddingProvider, OpenAiEmbedder};
use crate::embeddings::DEFAULT_METADATA_TEXT_CAP;
use crate::error::RagError;
use crate::generator::{AnswerGenerator, AnthropicGenerator, GenerationSettings, OpenAiGenerator};
use crate::ingest::{IngestControls, Ingestor};
use crate::query::{QueryControls, QueryPipeline};
use crate::retry::attempt_timeout;
use crate::throttle::Throttle;
use crate::vector_store::{IndexName, MemoryIndex, PineconeIndex, VectorIndex, DEFAULT_INDEX_NAME};

/// Embedding backends.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EmbeddingBackend {
    /// OpenAI `/embeddings`.
    Openai,
    /// Cohere `/embed` with document/query input types.
    Cohere,
}

/// Completion backends.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum GeneratorBackend {
    /// OpenAI chat completions.
    Openai,
    /// Anthropic messages.
    Anthropic,
}

/// Vector index backends.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum IndexBackend {
    /// Pinecone serverless or pod index.
    Pinecone,
    /// Process-local index; contents vanish on exit.
    Memory,
}

/// Command-line and environment settings for building the pipelines.
#[derive(Args, Clone)]
pub struct PipelineArgs {
    /// Embedding provider
    #[arg(long, env = "DOCQA_EMBEDDING_PROVIDER", value_enum, default_value = "openai")]
    pub embedding_provider: EmbeddingBackend,

    /// Answer generator provider
    #[arg(long, env = "DOCQA_LLM_PROVIDER", value_enum, default_value = "openai")]
    pub llm_provider: GeneratorBackend,

    /// Vector index backend
    #[arg(long, env = "DOCQA_VECTOR_INDEX", value_enum, default_value = "pinecone")]
    pub vector_index: IndexBackend,

    /// OpenAI API key (embeddings and/or chat)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL for OpenAI-compatible endpoints
    #[arg(long, env = "DOCQA_OPENAI_BASE", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// OpenAI embedding model
    #[arg(
        long,
        env = "DOCQA_OPENAI_EMBEDDING_MODEL",
        default_value = "text-embedding-ada-002"
    )]
    pub openai_embedding_model: String,

    /// Optional embedding dimension override
    #[arg(long, env = "DOCQA_OPENAI_DIMENSIONS")]
    pub openai_dimensions: Option<usize>,

    /// OpenAI chat model used for answers
    #[arg(long, env = "DOCQA_OPENAI_CHAT_MODEL", default_value = "gpt-4")]
    pub openai_chat_model: String,

    /// Cohere API key
    #[arg(long, env = "COHERE_API_KEY", hide_env_values = true)]
    pub cohere_api_key: Option<String>,

    /// Base URL for the Cohere API
    #[arg(long, env = "DOCQA_COHERE_BASE", default_value = "https://api.cohere.com/v1")]
    pub cohere_base_url: String,

    /// Cohere embedding model
    #[arg(long, env = "DOCQA_COHERE_MODEL", default_value = "embed-english-v3.0")]
    pub cohere_model: String,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// Anthropic model identifier
    #[arg(
        long,
        env = "DOCQA_ANTHROPIC_MODEL",
        default_value = "claude-3-sonnet-20240229"
    )]
    pub anthropic_model: String,

    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pub pinecone_api_key: Option<String>,

    /// Pinecone index name
    #[arg(long, env = "PINECONE_INDEX_NAME", default_value = DEFAULT_INDEX_NAME)]
    pub pinecone_index_name: String,

    /// Pinecone data-plane host (skips the describe-index lookup)
    #[arg(long, env = "PINECONE_INDEX_HOST")]
    pub pinecone_index_host: Option<String>,

    /// Pinecone namespace
    #[arg(long, env = "PINECONE_NAMESPACE")]
    pub pinecone_namespace: Option<String>,

    /// Max records per upsert request
    #[arg(long, env = "DOCQA_UPSERT_BATCH", default_value_t = 100)]
    pub upsert_batch_size: usize,

    /// JSON corpus to load instead of the bundled documents
    #[arg(long, env = "DOCQA_CORPUS")]
    pub corpus: Option<PathBuf>,

    /// Nearest neighbours retrieved per question
    #[arg(long, env = "DOCQA_TOP_K", default_value_t = 5)]
    pub top_k: usize,

    /// Words per chunk
    #[arg(long, env = "DOCQA_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Characters of chunk text stored as index metadata
    #[arg(long, env = "DOCQA_METADATA_TEXT_CAP", default_value_t = DEFAULT_METADATA_TEXT_CAP)]
    pub metadata_text_cap: usize,

    /// Optional character cap applied to questions before embedding
    #[arg(long, env = "DOCQA_QUERY_TEXT_CAP")]
    pub query_text_cap: Option<usize>,

    /// Retrieved passages placed in the generator context
    #[arg(long, env = "DOCQA_CONTEXT_LIMIT", default_value_t = 3)]
    pub context_limit: usize,

    /// Sampling temperature for the answer model
    #[arg(long, env = "DOCQA_TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    /// Maximum tokens to request from the completion model
    #[arg(long, env = "DOCQA_MAX_COMPLETION_TOKENS", default_value_t = 500)]
    pub max_completion_tokens: usize,

    /// Milliseconds between embedding calls during ingestion (0 disables)
    #[arg(long, env = "DOCQA_EMBED_INTERVAL_MS", default_value_t = 1000)]
    pub embed_interval_ms: u64,

    /// Seconds before any single provider call times out
    #[arg(long, env = "DOCQA_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Attempts per provider request when it hits 429/5xx or a transport error
    #[arg(long, env = "DOCQA_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: usize,

    /// Max cached query embeddings kept in-memory (0 disables caching)
    #[arg(long, env = "DOCQA_EMBEDDING_CACHE", default_value_t = 256)]
    pub embedding_cache_size: usize,

    /// Stale chunk ids per document deleted after ingestion (0 disables)
    #[arg(long, env = "DOCQA_PRUNE_WINDOW", default_value_t = 0)]
    pub prune_window: usize,
}

impl std::fmt::Debug for PipelineArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineArgs")
            .field("embedding_provider", &self.embedding_provider)
            .field("llm_provider", &self.llm_provider)
            .field("vector_index", &self.vector_index)
            .field("pinecone_index_name", &self.pinecone_index_name)
            .field("top_k", &self.top_k)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

/// Fully wired pipelines ready to serve.
pub struct Pipelines {
    /// Corpus loaded at startup.
    pub store: Arc<DocumentStore>,
    /// Ingestion pipeline.
    pub ingestor: Arc<Ingestor>,
    /// Query pipeline.
    pub query: Arc<QueryPipeline>,
}

impl PipelineArgs {
    /// Deadline applied to every provider call.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// HTTP timeout for one attempt, sized so retries fit inside the call deadline.
    pub fn attempt_timeout(&self) -> Duration {
        attempt_timeout(self.call_timeout(), self.max_retries)
    }

    /// Converts the parsed settings into ingestion controls.
    pub fn ingest_controls(&self) -> IngestControls {
        IngestControls {
            chunk_size: self.chunk_size.max(1),
            metadata_text_cap: self.metadata_text_cap,
            call_timeout: self.call_timeout(),
            prune_window: self.prune_window,
        }
    }

    /// Converts the parsed settings into query controls.
    pub fn query_controls(&self) -> QueryControls {
        QueryControls {
            top_k: self.top_k.max(1),
            context_limit: self.context_limit.max(1),
            query_text_cap: self.query_text_cap,
            call_timeout: self.call_timeout(),
            embedding_cache_size: self.embedding_cache_size,
        }
    }

    /// Ingestion throttle derived from the embed interval.
    pub fn embed_throttle(&self) -> Throttle {
        Throttle::every(Duration::from_millis(self.embed_interval_ms))
    }

    /// Checks that every selected backend has its credential.
    pub fn validate_credentials(&self) -> Result<(), RagError> {
        match self.embedding_provider {
            EmbeddingBackend::Openai => {
                require(&self.openai_api_key, "OPENAI_API_KEY", "openai embedding provider")?;
            }
            EmbeddingBackend::Cohere => {
                require(&self.cohere_api_key, "COHERE_API_KEY", "cohere embedding provider")?;
            }
        }
        match self.llm_provider {
            GeneratorBackend::Openai => {
                require(&self.openai_api_key, "OPENAI_API_KEY", "openai llm provider")?;
            }
            GeneratorBackend::Anthropic => {
                require(&self.anthropic_api_key, "ANTHROPIC_API_KEY", "anthropic llm provider")?;
            }
        }
        if self.vector_index == IndexBackend::Pinecone {
            require(&self.pinecone_api_key, "PINECONE_API_KEY", "pinecone vector index")?;
            IndexName::new(self.pinecone_index_name.as_str())
                .map_err(|err| RagError::Configuration(format!("{err:#}")))?;
        }
        Ok(())
    }

    /// Loads the corpus.
    pub fn load_store(&self) -> Result<DocumentStore, RagError> {
        match &self.corpus {
            Some(path) => DocumentStore::from_json_file(path)
                .map_err(|err| RagError::Configuration(format!("{err:#}"))),
            None => Ok(DocumentStore::builtin()),
        }
    }

    /// Builds the configured embedding provider.
    pub fn build_embedder(&self) -> Result<Arc<dyn EmbeddingProvider>, RagError> {
        let timeout = self.attempt_timeout();
        let embedder: Arc<dyn EmbeddingProvider> = match self.embedding_provider {
            EmbeddingBackend::Openai => {
                let key = require(&self.openai_api_key, "OPENAI_API_KEY", "openai embedding provider")?;
                Arc::new(
                    OpenAiEmbedder::new(
                        key,
                        &self.openai_base_url,
                        self.openai_embedding_model.clone(),
                        self.openai_dimensions,
                        timeout,
                        self.max_retries,
                    )
                    .map_err(config_error)?,
                )
            }
            EmbeddingBackend::Cohere => {
                let key = require(&self.cohere_api_key, "COHERE_API_KEY", "cohere embedding provider")?;
                Arc::new(
                    CohereEmbedder::new(
                        key,
                        &self.cohere_base_url,
                        self.cohere_model.clone(),
                        timeout,
                        self.max_retries,
                    )
                    .map_err(config_error)?,
                )
            }
        };
        Ok(embedder)
    }

    /// Builds the configured answer generator.
    pub fn build_generator(&self) -> Result<Arc<dyn AnswerGenerator>, RagError> {
        let settings = GenerationSettings {
            temperature: self.temperature,
            max_tokens: self.max_completion_tokens.max(1),
        };
        let timeout = self.attempt_timeout();
        let generator: Arc<dyn AnswerGenerator> = match self.llm_provider {
            GeneratorBackend::Openai => {
                let key = require(&self.openai_api_key, "OPENAI_API_KEY", "openai llm provider")?;
                Arc::new(
                    OpenAiGenerator::new(
                        key,
                        &self.openai_base_url,
                        self.openai_chat_model.clone(),
                        settings,
                        timeout,
                        self.max_retries,
                    )
                    .map_err(config_error)?,
                )
            }
            GeneratorBackend::Anthropic => {
                let key = require(&self.anthropic_api_key, "ANTHROPIC_API_KEY", "anthropic llm provider")?;
                Arc::new(
                    AnthropicGenerator::new(
                        key,
                        self.anthropic_model.clone(),
                        settings,
                        timeout,
                        self.max_retries,
                    )
                    .map_err(config_error)?,
                )
            }
        };
        Ok(generator)
    }

    /// Connects the configured vector index.
    pub async fn build_index(&self) -> Result<Arc<dyn VectorIndex>, RagError> {
        let index: Arc<dyn VectorIndex> = match self.vector_index {
            IndexBackend::Pinecone => {
                let key = require(&self.pinecone_api_key, "PINECONE_API_KEY", "pinecone vector index")?;
                let name = IndexName::new(self.pinecone_index_name.as_str()).map_err(config_error)?;
                Arc::new(
                    PineconeIndex::connect(
                        key,
                        name,
                        self.pinecone_index_host.clone(),
                        self.pinecone_namespace.clone(),
                        self.attempt_timeout(),
                        self.upsert_batch_size,
                        self.max_retries,
                    )
                    .await
                    .map_err(config_error)?,
                )
            }
            IndexBackend::Memory => Arc::new(MemoryIndex::with_max_batch(self.upsert_batch_size)),
        };
        Ok(index)
    }

    /// Validates credentials and wires both pipelines over shared clients.
    pub async fn build_pipelines(&self) -> Result<Pipelines, RagError> {
        self.validate_credentials()?;
        let store = Arc::new(self.load_store()?);
        let embedder = self.build_embedder()?;
        let generator = self.build_generator()?;
        let index = self.build_index().await?;
        info!(
            embedder = embedder.name(),
            generator = generator.name(),
            index = index.name(),
            documents = store.len(),
            "pipelines ready"
        );
        let ingestor = Ingestor::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            Arc::clone(&index),
            self.embed_throttle(),
            self.ingest_controls(),
        );
        let query = QueryPipeline::new(embedder, index, generator, self.query_controls());
        Ok(Pipelines {
            store,
            ingestor: Arc::new(ingestor),
            query: Arc::new(query),
        })
    }
}

fn require<'a>(value: &'a Option<String>, var: &str, purpose: &str) -> Result<&'a str, RagError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| RagError::Configuration(format!("{var} must be set for the {purpose}")))
}

fn config_error(err: anyhow::Error) -> RagError {
    RagError::Configuration(format!("{err:#}"))
}
