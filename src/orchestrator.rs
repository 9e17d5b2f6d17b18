//! Service facade for docqa.
//!
//! Owns the context store, both pipelines and the expiry sweeper, and exposes
//! the operations the CLI and HTTP layers build on.

use crate::chunking::{CharacterChunker, Chunker, ChunkingConfig};
use crate::config::{Prompts, Settings};
use crate::context::{ContextId, ContextStore, ContextSummary, ContextSweeper, SweepConfig};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{DocQaError, Result};
use crate::extract::{DocumentExtractor, TextExtractor};
use crate::generation::{Generator, OpenAIGenerator};
use crate::pipeline::{
    BatchOutcome, IngestOutcome, IngestPipeline, QueryOutcome, QueryPipeline, UploadedFile,
};
use crate::vector_index::IndexFactory;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, instrument};

/// The main entry point into the document QA service.
pub struct Orchestrator {
    settings: Settings,
    store: Arc<ContextStore>,
    embedder: Arc<dyn Embedder>,
    ingest: IngestPipeline,
    query: QueryPipeline,
    sweeper: Mutex<Option<ContextSweeper>>,
}

impl Orchestrator {
    /// Create an orchestrator with the providers named in `settings`.
    ///
    /// Fails if no embedding provider can start or the generation API key is
    /// missing.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let embedder = create_embedder(&settings.embedding)?;

        let generator: Arc<dyn Generator> = Arc::new(OpenAIGenerator::new(&settings.generation)?);
        info!("Using generation model {}", generator.model());

        Self::with_components(settings, prompts, embedder, generator)
    }

    /// Create an orchestrator with custom providers.
    pub fn with_components(
        settings: Settings,
        prompts: Prompts,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let temp_dir = settings.temp_dir();
        std::fs::create_dir_all(&temp_dir)?;

        let store = Arc::new(ContextStore::new(settings.contexts.max_idle()));
        let extractor: Arc<dyn TextExtractor> = Arc::new(DocumentExtractor::new());
        let chunker: Arc<dyn Chunker> =
            Arc::new(CharacterChunker::new(ChunkingConfig::from(&settings.chunking)));
        let index_factory = IndexFactory::new(&settings.vector_index, temp_dir);

        let ingest = IngestPipeline::new(
            store.clone(),
            extractor,
            chunker,
            embedder.clone(),
            index_factory,
        );
        let query = QueryPipeline::new(store.clone(), embedder.clone(), generator, prompts);

        Ok(Self {
            settings,
            store,
            embedder,
            ingest,
            query,
            sweeper: Mutex::new(None),
        })
    }

    /// Start the background expiry sweep. Does nothing if it already runs.
    /// Must be called within a tokio runtime.
    pub fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_none() {
            *sweeper = Some(ContextSweeper::spawn(
                self.store.clone(),
                SweepConfig::from(&self.settings.contexts),
            ));
        }
    }

    /// Stop the sweeper and release every context.
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.shutdown().await;
        }

        let released = self.store.clear();
        info!("Shut down, released {} contexts", released);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> Arc<ContextStore> {
        self.store.clone()
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    /// Allocate a new, empty context.
    pub fn create_context(&self) -> ContextId {
        self.store.create().id()
    }

    /// Ingest one file into a context, creating the context if needed.
    pub async fn ingest(
        &self,
        context_id: Option<&str>,
        bytes: Vec<u8>,
        filename: &str,
    ) -> IngestOutcome {
        self.ingest.ingest(context_id, bytes, filename).await
    }

    /// Ingest several files into one context.
    pub async fn ingest_batch(
        &self,
        context_id: Option<&str>,
        files: Vec<UploadedFile>,
    ) -> BatchOutcome {
        self.ingest.ingest_batch(context_id, files).await
    }

    /// Answer a question. `k` defaults to the configured value.
    #[instrument(skip(self, question))]
    pub async fn query(
        &self,
        context_id: Option<&str>,
        question: &str,
        k: Option<usize>,
    ) -> Result<QueryOutcome> {
        let k = k.unwrap_or(self.settings.contexts.default_k);
        self.query.query(context_id, question, k).await
    }

    /// Status of a context, refreshing its access time.
    pub fn get_context_status(&self, context_id: &str) -> Result<ContextSummary> {
        ContextId::parse(context_id)
            .and_then(|id| self.store.status(&id))
            .ok_or_else(|| DocQaError::NotFound(context_id.to_string()))
    }

    /// Delete a context. `false` if it did not exist.
    pub fn delete_context(&self, context_id: &str) -> bool {
        ContextId::parse(context_id)
            .map(|id| self.store.delete(&id))
            .unwrap_or(false)
    }

    /// Delete a context (if it exists) and hand out a fresh one.
    pub fn reset_context(&self, context_id: Option<&str>) -> ContextId {
        if let Some(old) = context_id {
            if self.delete_context(old) {
                info!("Reset context {}", old);
            }
        }
        self.create_context()
    }

    /// Snapshot of all live contexts.
    pub fn list_contexts(&self) -> Vec<ContextSummary> {
        self.store.list()
    }
}
