//! Embedding generation for indexing and retrieval.
//!
//! Providers are tried in the configured order when the service starts; the
//! first one that can be constructed is used for the lifetime of the process.

mod hashing;
mod openai;

pub use hashing::HashingEmbedder;
pub use openai::OpenAIEmbedder;

use crate::config::{EmbeddingProviderKind, EmbeddingSettings};
use crate::error::{DocQaError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Short provider name for logs and status output.
    fn name(&self) -> &str;
}

/// Build the embedder from the first provider in `settings.providers` that
/// can be constructed.
///
/// A provider that cannot start (for example a missing API key) is skipped
/// with a warning. If none can start the error is fatal.
pub fn create_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if settings.providers.is_empty() {
        return Err(DocQaError::Config(
            "No embedding providers configured".to_string(),
        ));
    }

    let mut failures = Vec::new();

    for kind in &settings.providers {
        let attempt: Result<Arc<dyn Embedder>> = match kind {
            EmbeddingProviderKind::OpenAI => {
                OpenAIEmbedder::new(settings).map(|e| Arc::new(e) as Arc<dyn Embedder>)
            }
            EmbeddingProviderKind::Hashing => {
                Ok(Arc::new(HashingEmbedder::new(settings.dimensions as usize)))
            }
        };

        match attempt {
            Ok(embedder) => {
                info!(
                    "Using {} embeddings ({} dimensions)",
                    embedder.name(),
                    embedder.dimensions()
                );
                return Ok(embedder);
            }
            Err(e) => {
                warn!("Embedding provider {} unavailable: {}", kind, e);
                failures.push(format!("{}: {}", kind, e));
            }
        }
    }

    Err(DocQaError::Config(format!(
        "No embedding provider could be started ({})",
        failures.join("; ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_falls_back_past_missing_credentials() {
        let settings = EmbeddingSettings {
            providers: vec![EmbeddingProviderKind::OpenAI, EmbeddingProviderKind::Hashing],
            api_key_env: "DOCQA_TEST_EMBED_KEY_NEVER_SET".to_string(),
            dimensions: 64,
            ..Default::default()
        };

        let embedder = create_embedder(&settings).unwrap();
        assert_eq!(embedder.name(), "hashing");
        assert_eq!(embedder.dimensions(), 64);
    }

    #[test]
    fn test_exhausted_chain_is_fatal() {
        let settings = EmbeddingSettings {
            providers: vec![EmbeddingProviderKind::OpenAI],
            api_key_env: "DOCQA_TEST_EMBED_KEY_NEVER_SET".to_string(),
            ..Default::default()
        };

        let err = create_embedder(&settings).err().unwrap();
        assert!(matches!(err, DocQaError::Config(_)));
    }

    #[test]
    fn test_empty_chain_is_fatal() {
        let settings = EmbeddingSettings {
            providers: Vec::new(),
            ..Default::default()
        };
        assert!(create_embedder(&settings).is_err());
    }
}
