//! Question → top-k chunks → prompt → answer.

use super::{dedup_sources, QueryOutcome, NO_DOCUMENTS_ANSWER, QUERY_FAILED_ANSWER};
use crate::config::Prompts;
use crate::context::{ContextEntry, ContextStore};
use crate::embedding::Embedder;
use crate::error::{DocQaError, Result};
use crate::generation::{GenerationRequest, Generator};
use crate::vector_index::ScoredChunk;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Format retrieved chunks for inclusion in a prompt.
pub fn format_context_for_prompt(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, scored)| {
            format!(
                "[{}] {} (relevance: {:.0}%)\n{}",
                i + 1,
                scored.chunk.source_filename,
                scored.similarity * 100.0,
                scored.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Answers questions against a context's indexed chunks.
pub struct QueryPipeline {
    store: Arc<ContextStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    prompts: Prompts,
}

impl QueryPipeline {
    pub fn new(
        store: Arc<ContextStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        prompts: Prompts,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            prompts,
        }
    }

    /// Answer `question` from the `k` most relevant chunks.
    ///
    /// Only a blank question or `k == 0` is an `Err`. A context without
    /// documents, and any retrieval or generation failure, come back as an
    /// outcome.
    #[instrument(skip(self, question))]
    pub async fn query(&self, context_id: Option<&str>, question: &str, k: usize) -> Result<QueryOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DocQaError::Validation("Question cannot be empty".to_string()));
        }
        if k == 0 {
            return Err(DocQaError::Validation("k must be greater than 0".to_string()));
        }

        let (entry, created) = self.store.resolve(context_id);

        let index = match entry.index() {
            Some(index) => index,
            None => {
                debug!("Context {} has no documents", entry.id());
                return Ok(no_documents(&entry, question, created));
            }
        };

        let mut outcome = QueryOutcome {
            context_id: entry.id(),
            question: question.to_string(),
            answer: String::new(),
            has_documents: true,
            chunk_count: entry.chunk_count(),
            sources: dedup_sources(entry.sources()),
            chunks: Vec::new(),
            error: None,
            context_created: false,
        };

        let retrieved = async {
            let query_embedding = self.embedder.embed(question).await?;
            index.search(&query_embedding, k).await
        }
        .await;

        match retrieved {
            Ok(chunks) => outcome.chunks = chunks,
            Err(e) => {
                warn!("Retrieval failed for context {}: {}", entry.id(), e);
                outcome.answer = QUERY_FAILED_ANSWER.to_string();
                outcome.error = Some(e.to_string());
                return Ok(outcome);
            }
        }

        let request = self.build_request(question, &outcome.chunks);

        match self.generator.generate(&request).await {
            Ok(answer) => {
                info!(
                    "Answered question in context {} from {} chunks",
                    entry.id(),
                    outcome.chunks.len()
                );
                outcome.answer = answer;
            }
            Err(e) => {
                warn!("Generation failed for context {}: {}", entry.id(), e);
                outcome.answer = QUERY_FAILED_ANSWER.to_string();
                outcome.error = Some(e.to_string());
            }
        }

        Ok(outcome)
    }

    fn build_request(&self, question: &str, chunks: &[ScoredChunk]) -> GenerationRequest {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), format_context_for_prompt(chunks));

        GenerationRequest {
            system: self.prompts.render_with_custom(&self.prompts.qa.system, &vars),
            user: self.prompts.render_with_custom(&self.prompts.qa.user, &vars),
        }
    }
}

fn no_documents(entry: &ContextEntry, question: &str, created: bool) -> QueryOutcome {
    QueryOutcome {
        context_id: entry.id(),
        question: question.to_string(),
        answer: NO_DOCUMENTS_ANSWER.to_string(),
        has_documents: false,
        chunk_count: 0,
        sources: Vec::new(),
        chunks: Vec::new(),
        error: None,
        context_created: created,
    }
}
