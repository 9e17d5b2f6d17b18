//! File → text → chunks → embeddings → index.

use super::{BatchOutcome, BatchStatus, IngestFailure, IngestOutcome, UploadedFile};
use crate::chunking::{Chunk, Chunker};
use crate::context::{ContextEntry, ContextStore};
use crate::embedding::Embedder;
use crate::error::DocQaError;
use crate::extract::TextExtractor;
use crate::vector_index::{EmbeddedChunk, IndexFactory};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

type Failure = (IngestFailure, String);

/// Turns uploaded files into indexed chunks within a context.
pub struct IngestPipeline {
    store: Arc<ContextStore>,
    extractor: Arc<dyn TextExtractor>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    index_factory: IndexFactory,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<ContextStore>,
        extractor: Arc<dyn TextExtractor>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        index_factory: IndexFactory,
    ) -> Self {
        Self {
            store,
            extractor,
            chunker,
            embedder,
            index_factory,
        }
    }

    /// Ingest one file. Absent, blank, malformed or unknown ids get a new context.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn ingest(&self, context_id: Option<&str>, bytes: Vec<u8>, filename: &str) -> IngestOutcome {
        let (entry, created) = self.store.resolve(context_id);
        let mut outcome = self.ingest_into(&entry, bytes, filename).await;
        outcome.context_created = created;
        outcome
    }

    /// Ingest several files into one context, resolved once.
    ///
    /// One file failing never affects the others.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn ingest_batch(&self, context_id: Option<&str>, files: Vec<UploadedFile>) -> BatchOutcome {
        let (entry, created) = self.store.resolve(context_id);

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let mut outcome = self.ingest_into(&entry, file.bytes, &file.filename).await;
            outcome.context_created = created;
            results.push(outcome);
        }

        let status = BatchStatus::from_results(&results);
        let chunk_count = entry.chunk_count();
        info!(
            "Batch into context {}: {:?}, {} chunks total",
            entry.id(),
            status,
            chunk_count
        );

        BatchOutcome {
            context_id: entry.id(),
            status,
            results,
            chunk_count,
            has_documents: chunk_count > 0,
            context_created: created,
        }
    }

    async fn ingest_into(&self, entry: &Arc<ContextEntry>, bytes: Vec<u8>, filename: &str) -> IngestOutcome {
        let filename = filename.trim();

        match self.try_ingest(entry, bytes, filename).await {
            Ok((added, total)) => {
                info!("Ingested {} ({} chunks) into context {}", filename, added, entry.id());
                IngestOutcome {
                    context_id: entry.id(),
                    filename: filename.to_string(),
                    success: true,
                    chunks_added: added,
                    chunk_count: total,
                    message: format!("Processed {} into {} chunks", filename, added),
                    failure: None,
                    context_created: false,
                }
            }
            Err((failure, message)) => {
                warn!("Failed to ingest {:?} into context {}: {}", filename, entry.id(), message);
                IngestOutcome {
                    context_id: entry.id(),
                    filename: filename.to_string(),
                    success: false,
                    chunks_added: 0,
                    chunk_count: entry.chunk_count(),
                    message,
                    failure: Some(failure),
                    context_created: false,
                }
            }
        }
    }

    async fn try_ingest(
        &self,
        entry: &Arc<ContextEntry>,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<(usize, usize), Failure> {
        if filename.is_empty() {
            return Err((IngestFailure::Validation, "Filename is required".to_string()));
        }
        if bytes.is_empty() {
            return Err((IngestFailure::Validation, format!("{} is empty", filename)));
        }
        if !self.extractor.supports(filename) {
            return Err((
                IngestFailure::Validation,
                format!(
                    "Unsupported file type: {} (supported: {})",
                    filename,
                    self.extractor.supported_extensions().join(", ")
                ),
            ));
        }

        let text = self.extract(bytes, filename).await?;
        if text.trim().is_empty() {
            return Err((
                IngestFailure::NoText,
                format!("No text could be extracted from {}", filename),
            ));
        }

        let chunks = self.chunker.chunk_document(&text, filename, entry.id());
        if chunks.is_empty() {
            return Err((
                IngestFailure::NoText,
                format!("No chunks were produced from {}", filename),
            ));
        }
        debug!("Split {} into {} chunks", filename, chunks.len());

        // Embedding runs outside every context lock.
        let embedded = self.embed(chunks).await?;
        let added = embedded.len();

        let _guard = entry.lock_ingest().await;

        if entry.is_released() {
            return Err(context_deleted(entry));
        }

        let (index, resource) = match entry.index() {
            Some(index) => (index, None),
            None => {
                let created = self
                    .index_factory
                    .create(entry.id(), self.embedder.dimensions())
                    .map_err(|e| (IngestFailure::Index, e.to_string()))?;
                (created.index, created.resource)
            }
        };

        if let Err(e) = index.insert(embedded).await {
            if let Some(mut resource) = resource {
                resource.release();
            }
            return Err((IngestFailure::Index, e.to_string()));
        }

        let total = entry
            .commit_ingest(index, resource, added, filename)
            .map_err(|e| match e {
                DocQaError::NotFound(_) => context_deleted(entry),
                other => (IngestFailure::Index, other.to_string()),
            })?;

        Ok((added, total))
    }

    async fn extract(&self, bytes: Vec<u8>, filename: &str) -> Result<String, Failure> {
        let extractor = self.extractor.clone();
        let name = filename.to_string();

        let result = tokio::task::spawn_blocking(move || extractor.extract(&bytes, &name))
            .await
            .map_err(|e| (IngestFailure::Extraction, format!("Extraction task failed: {}", e)))?;

        result.map_err(|e| {
            let kind = if e.is_validation() {
                IngestFailure::Validation
            } else {
                IngestFailure::Extraction
            };
            (kind, e.to_string())
        })
    }

    async fn embed(&self, chunks: Vec<Chunk>) -> Result<Vec<EmbeddedChunk>, Failure> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| (IngestFailure::Embedding, e.to_string()))?;

        if embeddings.len() != chunks.len() {
            return Err((
                IngestFailure::Embedding,
                format!(
                    "Embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    chunks.len()
                ),
            ));
        }

        Ok(chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
            .collect())
    }
}

fn context_deleted(entry: &ContextEntry) -> Failure {
    (
        IngestFailure::ContextDeleted,
        format!("Context {} was deleted during ingestion", entry.id()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{CharacterChunker, ChunkingConfig};
    use crate::config::{IndexBackend, MetricSetting, VectorIndexSettings};
    use crate::embedding::HashingEmbedder;
    use crate::error::Result;
    use crate::extract::DocumentExtractor;
    use crate::vector_index::DistanceMetric;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Fails every call while `failing` is set.
    struct FlakyEmbedder {
        inner: HashingEmbedder,
        failing: AtomicBool,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(DocQaError::Embedding("provider offline".to_string()));
            }
            self.inner.embed_batch(texts).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    /// Never finishes a batch while `stalled` is set.
    struct StallingEmbedder {
        inner: HashingEmbedder,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl Embedder for StallingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.stalled.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.inner.embed_batch(texts).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn name(&self) -> &str {
            "stalling"
        }
    }

    fn pipeline_using(
        store: Arc<ContextStore>,
        embedder: Arc<dyn Embedder>,
        index_factory: IndexFactory,
    ) -> IngestPipeline {
        IngestPipeline::new(
            store,
            Arc::new(DocumentExtractor::new()),
            Arc::new(CharacterChunker::new(ChunkingConfig {
                chunk_size: 1000,
                chunk_overlap: 200,
            })),
            embedder,
            index_factory,
        )
    }

    fn pipeline_with(store: Arc<ContextStore>, embedder: Arc<dyn Embedder>) -> IngestPipeline {
        pipeline_using(store, embedder, IndexFactory::memory(DistanceMetric::Cosine))
    }

    fn sqlite_factory(dir: &Path) -> IndexFactory {
        let settings = VectorIndexSettings {
            backend: IndexBackend::Sqlite,
            metric: MetricSetting::Cosine,
        };
        IndexFactory::new(&settings, dir.to_path_buf())
    }

    fn scratch_dirs(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("ctx-"))
            .count()
    }

    fn pipeline(store: Arc<ContextStore>) -> IngestPipeline {
        pipeline_with(store, Arc::new(HashingEmbedder::new(64)))
    }

    #[tokio::test]
    async fn test_three_thousand_chars_yield_four_chunks() {
        let store = Arc::new(ContextStore::default());
        let pipeline = pipeline(store.clone());
        let id = store.create().id().to_string();

        let text = "abcdefghij".repeat(300);
        let outcome = pipeline.ingest(Some(id.as_str()), text.into_bytes(), "file.txt").await;

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.chunks_added, 4);
        assert_eq!(outcome.chunk_count, 4);
        assert!(!outcome.context_created);

        let summary = &store.list()[0];
        assert_eq!(summary.chunk_count, 4);
        assert_eq!(summary.sources, vec!["file.txt"]);
    }

    #[tokio::test]
    async fn test_empty_upload_still_returns_a_context() {
        let store = Arc::new(ContextStore::default());
        let pipeline = pipeline(store.clone());

        let outcome = pipeline.ingest(None, Vec::new(), "a.pdf").await;

        assert!(!outcome.success);
        assert!(outcome.is_validation_failure());
        assert!(outcome.context_created);
        assert_eq!(outcome.chunk_count, 0);

        let entry = store.get(&outcome.context_id).unwrap();
        assert_eq!(entry.chunk_count(), 0);
        assert!(entry.index().is_none());
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let store = Arc::new(ContextStore::default());
        let pipeline = pipeline(store);

        let missing_name = pipeline.ingest(None, b"text".to_vec(), "  ").await;
        assert!(missing_name.is_validation_failure());

        let unsupported = pipeline.ingest(None, b"text".to_vec(), "image.png").await;
        assert!(unsupported.is_validation_failure());
    }

    #[tokio::test]
    async fn test_blank_text_is_a_per_file_failure() {
        let store = Arc::new(ContextStore::default());
        let pipeline = pipeline(store);

        let outcome = pipeline.ingest(None, b"   \n\n  ".to_vec(), "blank.txt").await;
        assert_eq!(outcome.failure, Some(IngestFailure::NoText));
        assert_eq!(outcome.chunk_count, 0);
    }

    #[tokio::test]
    async fn test_failed_file_keeps_prior_chunks() {
        let store = Arc::new(ContextStore::default());
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashingEmbedder::new(32),
            failing: AtomicBool::new(false),
        });
        let pipeline = pipeline_with(store.clone(), embedder.clone());

        let first = pipeline.ingest(None, b"first document".to_vec(), "one.txt").await;
        assert!(first.success);
        let id = first.context_id.to_string();

        embedder.failing.store(true, Ordering::SeqCst);
        let second = pipeline.ingest(Some(id.as_str()), b"second document".to_vec(), "two.txt").await;
        assert_eq!(second.failure, Some(IngestFailure::Embedding));
        assert_eq!(second.chunk_count, 1);

        let entry = store.get(&first.context_id).unwrap();
        assert_eq!(entry.sources(), vec!["one.txt"]);
        assert_eq!(entry.index().unwrap().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_reports_mixed_status() {
        let store = Arc::new(ContextStore::default());
        let pipeline = pipeline(store);

        let outcome = pipeline
            .ingest_batch(
                None,
                vec![
                    UploadedFile::new("good.md", "# Title\n\nSome body text."),
                    UploadedFile::new("bad.doc", "legacy"),
                    UploadedFile::new("also-good.txt", "More text."),
                ],
            )
            .await;

        assert_eq!(outcome.status, BatchStatus::Mixed);
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results.iter().all(|r| r.context_id == outcome.context_id));
        assert_eq!(outcome.chunk_count, 2);
        assert!(outcome.has_documents);
    }

    #[tokio::test]
    async fn test_concurrent_ingestions_into_one_context() {
        let store = Arc::new(ContextStore::default());
        let pipeline = Arc::new(pipeline(store.clone()));
        let id = store.create().id().to_string();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let pipeline = pipeline.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    pipeline
                        .ingest(Some(id.as_str()), format!("document number {}", i).into_bytes(), &format!("doc{}.txt", i))
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().success);
        }

        let entry = store.get_str(&id).unwrap();
        assert_eq!(entry.chunk_count(), 8);
        assert_eq!(entry.sources().len(), 8);
        assert_eq!(entry.index().unwrap().len().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_ingest_into_deleted_context_fails_cleanly() {
        let store = Arc::new(ContextStore::default());
        let pipeline = pipeline(store.clone());
        let entry = store.create();
        store.delete(&entry.id());

        let outcome = pipeline.ingest_into(&entry, b"late text".to_vec(), "late.txt").await;
        assert_eq!(outcome.failure, Some(IngestFailure::ContextDeleted));
        assert!(entry.index().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_ingestion_leaves_context_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ContextStore::default());
        let embedder = Arc::new(StallingEmbedder {
            inner: HashingEmbedder::new(32),
            stalled: AtomicBool::new(false),
        });
        let pipeline = pipeline_using(store.clone(), embedder.clone(), sqlite_factory(dir.path()));

        let first = pipeline.ingest(None, b"first document".to_vec(), "one.txt").await;
        assert!(first.success, "{}", first.message);
        let id = first.context_id.to_string();
        assert_eq!(scratch_dirs(dir.path()), 1);

        embedder.stalled.store(true, Ordering::SeqCst);
        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            pipeline.ingest(Some(id.as_str()), b"second document".to_vec(), "two.txt"),
        )
        .await;
        assert!(cancelled.is_err());

        let entry = store.get(&first.context_id).unwrap();
        assert_eq!(entry.chunk_count(), 1);
        assert_eq!(entry.sources(), vec!["one.txt"]);
        assert_eq!(entry.index().unwrap().len().await.unwrap(), 1);
        assert_eq!(scratch_dirs(dir.path()), 1);

        // A context with no index yet gains nothing on disk either.
        let fresh = store.create();
        let fresh_id = fresh.id().to_string();
        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            pipeline.ingest(Some(fresh_id.as_str()), b"third document".to_vec(), "three.txt"),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(fresh.chunk_count(), 0);
        assert!(fresh.index().is_none());
        assert_eq!(scratch_dirs(dir.path()), 1);

        // The ingest lock was not left held.
        embedder.stalled.store(false, Ordering::SeqCst);
        let resumed = pipeline.ingest(Some(id.as_str()), b"fourth document".to_vec(), "four.txt").await;
        assert!(resumed.success, "{}", resumed.message);
        assert_eq!(resumed.chunk_count, 2);

        store.clear();
        assert_eq!(scratch_dirs(dir.path()), 0);
    }
}
