//! Ingestion and query pipelines.
//!
//! Both pipelines convert every per-request failure into a structured
//! outcome. The only `Err` either of them returns is a query rejected for
//! invalid input.

mod ingest;
mod query;

pub use ingest::IngestPipeline;
pub use query::{format_context_for_prompt, QueryPipeline};

use crate::context::ContextId;
use crate::vector_index::ScoredChunk;
use serde::{Deserialize, Serialize};

/// Answer returned when a context has nothing indexed yet.
pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been processed yet. Please upload documents first.";

/// Answer returned when retrieval or generation fails for a query.
pub const QUERY_FAILED_ANSWER: &str = "An error occurred while processing your question.";

/// An uploaded file awaiting ingestion.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Why a file was not ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestFailure {
    /// Empty upload, missing filename or unsupported extension.
    Validation,
    /// The extractor could not read the document.
    Extraction,
    /// The document produced no text or no chunks.
    NoText,
    /// The embedding provider failed.
    Embedding,
    /// The vector index rejected the insertion.
    Index,
    /// The context was deleted while the file was being ingested.
    ContextDeleted,
}

/// Result of ingesting one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub context_id: ContextId,
    pub filename: String,
    pub success: bool,
    /// Chunks added by this file.
    pub chunks_added: usize,
    /// Total chunks in the context afterwards.
    pub chunk_count: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<IngestFailure>,
    /// Whether resolving the context created it.
    pub context_created: bool,
}

impl IngestOutcome {
    pub fn is_validation_failure(&self) -> bool {
        self.failure == Some(IngestFailure::Validation)
    }
}

/// Overall status of a multi-file upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Mixed,
    Failed,
}

impl BatchStatus {
    /// Derive the status from per-file results. An empty batch has failed.
    pub fn from_results(results: &[IngestOutcome]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        match succeeded {
            0 => BatchStatus::Failed,
            n if n == results.len() => BatchStatus::Success,
            _ => BatchStatus::Mixed,
        }
    }
}

/// Result of ingesting several files into one context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub context_id: ContextId,
    pub status: BatchStatus,
    pub results: Vec<IngestOutcome>,
    pub chunk_count: usize,
    pub has_documents: bool,
    pub context_created: bool,
}

/// Result of a question against a context.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub context_id: ContextId,
    pub question: String,
    pub answer: String,
    pub has_documents: bool,
    pub chunk_count: usize,
    /// Documents ingested into the context, without duplicates.
    pub sources: Vec<String>,
    /// Retrieved chunks, best first.
    pub chunks: Vec<ScoredChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub context_created: bool,
}

/// Remove repeated names, keeping first occurrences in order.
pub(crate) fn dedup_sources<I, S>(sources: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = std::collections::HashSet::new();
    sources
        .into_iter()
        .map(Into::into)
        .filter(|s| seen.insert(s.clone()))
        .collect()
}
