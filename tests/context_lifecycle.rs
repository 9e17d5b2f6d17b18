//! End-to-end context lifecycle through the public API.

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use docqa::config::{IndexBackend, Prompts, Settings};
use docqa::embedding::HashingEmbedder;
use docqa::generation::{GenerationRequest, Generator};
use docqa::orchestrator::Orchestrator;
use docqa::pipeline::{BatchStatus, IngestFailure, UploadedFile, NO_DOCUMENTS_ANSWER};
use docqa::{DocQaError, Result};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct CountingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("generated answer".to_string())
    }

    fn model(&self) -> &str {
        "counting"
    }
}

struct Harness {
    orchestrator: Orchestrator,
    generator: Arc<CountingGenerator>,
    dir: tempfile::TempDir,
}

fn harness(backend: IndexBackend) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.general.temp_dir = dir.path().to_string_lossy().to_string();
    settings.vector_index.backend = backend;

    let generator = Arc::new(CountingGenerator::default());
    let orchestrator = Orchestrator::with_components(
        settings,
        Prompts::default(),
        Arc::new(HashingEmbedder::new(256)),
        generator.clone(),
    )
    .unwrap();

    Harness {
        orchestrator,
        generator,
        dir,
    }
}

/// ASCII text of exactly `len` characters made of distinct sentences.
fn document(topic: &str, len: usize) -> String {
    let mut text = String::new();
    let mut i = 0;
    while text.len() < len {
        text.push_str(&format!("The {} note number {} is recorded here. ", topic, i));
        i += 1;
    }
    text.truncate(len);
    text
}

fn scratch_dirs(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("ctx-"))
        .count()
}

#[tokio::test]
async fn test_three_thousand_characters_make_four_chunks() {
    let h = harness(IndexBackend::Memory);
    let id = h.orchestrator.create_context().to_string();

    let before = h
        .orchestrator
        .query(Some(id.as_str()), "placeholder", Some(1))
        .await
        .unwrap();
    assert!(!before.has_documents);
    assert_eq!(before.answer, NO_DOCUMENTS_ANSWER);

    let outcome = h
        .orchestrator
        .ingest(Some(id.as_str()), "abcdefghij".repeat(300).into_bytes(), "file.txt")
        .await;
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.chunks_added, 4);
    assert_eq!(outcome.chunk_count, 4);

    let listed = h.orchestrator.list_contexts();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].context_id.to_string(), id);
    assert_eq!(listed[0].chunk_count, 4);
    assert_eq!(listed[0].sources, vec!["file.txt".to_string()]);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_pdf_still_returns_new_context() {
    let h = harness(IndexBackend::Memory);

    let outcome = h.orchestrator.ingest(None, Vec::new(), "a.pdf").await;
    assert!(!outcome.success);
    assert_eq!(outcome.failure, Some(IngestFailure::Validation));
    assert!(outcome.context_created);

    let status = h
        .orchestrator
        .get_context_status(&outcome.context_id.to_string())
        .unwrap();
    assert_eq!(status.chunk_count, 0);
    assert!(status.sources.is_empty());
}

#[tokio::test]
async fn test_chunk_count_is_sum_of_successful_files() {
    let h = harness(IndexBackend::Memory);
    let id = h.orchestrator.create_context().to_string();

    let files = vec![
        UploadedFile::new("one.txt", document("alpha", 1500)),
        UploadedFile::new("empty.md", Vec::new()),
        UploadedFile::new("two.md", document("beta", 900)),
        UploadedFile::new("slides.ppt", b"legacy".to_vec()),
        UploadedFile::new("blank.txt", b"   \n\n  ".to_vec()),
    ];
    let batch = h.orchestrator.ingest_batch(Some(id.as_str()), files).await;

    assert_eq!(batch.status, BatchStatus::Mixed);
    let produced: usize = batch.results.iter().map(|r| r.chunks_added).sum();
    assert_eq!(produced, 2 + 1);
    assert_eq!(batch.chunk_count, produced);
    assert!(batch
        .results
        .iter()
        .filter(|r| !r.success)
        .all(|r| r.chunks_added == 0));

    let status = h.orchestrator.get_context_status(&id).unwrap();
    assert_eq!(status.chunk_count, produced);
    assert_eq!(status.sources, vec!["one.txt".to_string(), "two.md".to_string()]);
}

#[tokio::test]
async fn test_no_documents_never_calls_generator() {
    let h = harness(IndexBackend::Memory);

    let fresh = h.orchestrator.query(None, "anything?", Some(3)).await.unwrap();
    assert!(!fresh.has_documents);
    assert!(fresh.context_created);

    let id = h.orchestrator.create_context().to_string();
    h.orchestrator.ingest(Some(id.as_str()), Vec::new(), "a.txt").await;
    let empty = h.orchestrator.query(Some(id.as_str()), "anything?", None).await.unwrap();
    assert!(!empty.has_documents);
    assert!(empty.chunks.is_empty());

    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_search_returns_min_of_k_and_n_in_distance_order() {
    for backend in [IndexBackend::Memory, IndexBackend::Sqlite] {
        let h = harness(backend);
        let ingested = h
            .orchestrator
            .ingest(None, document("harbour", 2500).into_bytes(), "port.txt")
            .await;
        assert_eq!(ingested.chunk_count, 3);
        let id = ingested.context_id.to_string();

        let few = h
            .orchestrator
            .query(Some(id.as_str()), "harbour note", Some(10))
            .await
            .unwrap();
        assert_eq!(few.chunks.len(), 3);

        let some = h
            .orchestrator
            .query(Some(id.as_str()), "harbour note", Some(2))
            .await
            .unwrap();
        assert_eq!(some.chunks.len(), 2);

        for result in [&few, &some] {
            for pair in result.chunks.windows(2) {
                assert!(pair[0].distance <= pair[1].distance);
                assert!(pair[0].similarity >= pair[1].similarity);
            }
        }
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 2);
    }
}

#[tokio::test]
async fn test_round_trip_retrieves_only_own_chunks() {
    let h = harness(IndexBackend::Memory);

    let other = h
        .orchestrator
        .ingest(None, document("weather", 2000).into_bytes(), "weather.txt")
        .await;
    assert!(other.success);

    let mine = h
        .orchestrator
        .ingest(None, document("weather", 2200).into_bytes(), "forecast.md")
        .await;
    assert!(mine.success);
    assert_ne!(mine.context_id, other.context_id);

    let id = mine.context_id.to_string();
    let outcome = h
        .orchestrator
        .query(Some(id.as_str()), "weather note", Some(mine.chunk_count + 5))
        .await
        .unwrap();

    assert_eq!(outcome.chunks.len(), mine.chunk_count);
    assert!(outcome
        .chunks
        .iter()
        .all(|c| c.chunk.source_filename == "forecast.md" && c.chunk.context_id == mine.context_id));
    assert_eq!(outcome.sources, vec!["forecast.md".to_string()]);
}

#[tokio::test]
async fn test_delete_twice_reports_not_found() {
    let h = harness(IndexBackend::Memory);
    let id = h.orchestrator.create_context().to_string();

    assert!(h.orchestrator.delete_context(&id));
    assert!(!h.orchestrator.delete_context(&id));
    assert!(matches!(
        h.orchestrator.get_context_status(&id),
        Err(DocQaError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_sweep_removes_idle_contexts_and_their_files() {
    let h = harness(IndexBackend::Sqlite);
    let store = h.orchestrator.store();

    let ingested = h
        .orchestrator
        .ingest(None, document("archive", 1200).into_bytes(), "archive.txt")
        .await;
    assert!(ingested.success, "{}", ingested.message);
    assert_eq!(scratch_dirs(h.dir.path()), 1);

    let entry = store.get(&ingested.context_id).unwrap();
    assert_eq!(entry.temp_resource_count(), 1);

    let swept = store.sweep(Utc::now() + TimeDelta::hours(25), TimeDelta::hours(24));
    assert_eq!(swept, vec![ingested.context_id]);

    assert!(h.orchestrator.list_contexts().is_empty());
    assert!(entry.is_released());
    assert!(entry.index().is_none());
    assert_eq!(entry.temp_resource_count(), 0);
    assert_eq!(scratch_dirs(h.dir.path()), 0);
}

#[tokio::test]
async fn test_shutdown_releases_scratch_space() {
    let h = harness(IndexBackend::Sqlite);
    for name in ["a.txt", "b.txt"] {
        let outcome = h
            .orchestrator
            .ingest(None, document("ledger", 500).into_bytes(), name)
            .await;
        assert!(outcome.success);
    }
    assert_eq!(scratch_dirs(h.dir.path()), 2);

    h.orchestrator.start_sweeper();
    h.orchestrator.shutdown().await;

    assert!(h.orchestrator.list_contexts().is_empty());
    assert_eq!(scratch_dirs(h.dir.path()), 0);
}
