//! OpenAI-compatible embeddings implementation.

use super::Embedder;
use crate::config::EmbeddingSettings;
use crate::error::{DocQaError, Result};
use crate::openai::{create_client, Endpoint};
use async_openai::config::OpenAIConfig;
use async_openai::types::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, instrument};

/// Providers cap the number of inputs per request.
const BATCH_SIZE: usize = 100;

/// Requests in flight at once for large inputs.
const MAX_CONCURRENT_BATCHES: usize = 4;

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAIEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbedder {
    /// Create an embedder from settings. Fails if the API key is missing.
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let endpoint = Endpoint {
            api_base: settings.api_base.clone(),
            api_key_env: settings.api_key_env.clone(),
        };

        Ok(Self {
            client: create_client(&endpoint)?,
            model: settings.model.clone(),
            dimensions: settings.dimensions as usize,
        })
    }

    /// Embed one request-sized batch, preserving input order.
    async fn embed_chunk(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(batch.to_vec()))
            .dimensions(self.dimensions as u32)
            .build()
            .map_err(|e| DocQaError::Embedding(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| DocQaError::OpenAI(format!("Embedding API error: {}", e)))?;

        if response.data.len() != batch.len() {
            return Err(DocQaError::Embedding(format!(
                "Expected {} embeddings, got {}",
                batch.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|e| e.index);

        data.into_iter()
            .map(|e| {
                if e.embedding.len() == self.dimensions {
                    Ok(e.embedding)
                } else {
                    Err(DocQaError::Embedding(format!(
                        "Model {} returned {} dimensions, expected {}",
                        self.model,
                        e.embedding.len(),
                        self.dimensions
                    )))
                }
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    #[instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| DocQaError::Embedding("Empty embedding response".to_string()))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let requests: Vec<_> = texts
            .chunks(BATCH_SIZE)
            .map(|batch| self.embed_chunk(batch))
            .collect();
        let mut batches = stream::iter(requests).buffered(MAX_CONCURRENT_BATCHES);

        let mut all_embeddings = Vec::with_capacity(texts.len());
        while let Some(result) = batches.next().await {
            all_embeddings.extend(result?);
        }

        debug!("Generated {} embeddings", all_embeddings.len());
        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves `/v1/embeddings`, answering each input `"t{n}"` with `[n, 1.0]`
    /// and listing the results in reverse order.
    async fn stub_endpoint(requests: Arc<AtomicUsize>) -> String {
        async fn embeddings(
            State(requests): State<Arc<AtomicUsize>>,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            requests.fetch_add(1, Ordering::SeqCst);
            let inputs = body["input"].as_array().cloned().unwrap_or_default();
            let mut data: Vec<Value> = inputs
                .iter()
                .enumerate()
                .map(|(index, input)| {
                    let n: f32 = input.as_str().unwrap()[1..].parse().unwrap();
                    json!({ "object": "embedding", "index": index, "embedding": [n, 1.0] })
                })
                .collect();
            data.reverse();
            Json(json!({
                "object": "list",
                "model": body["model"],
                "data": data,
                "usage": { "prompt_tokens": 0, "total_tokens": 0 }
            }))
        }

        let app = Router::new()
            .route("/v1/embeddings", post(embeddings))
            .with_state(requests);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    #[test]
    fn test_embedder_creation() {
        std::env::set_var("DOCQA_TEST_EMBED_KEY_PRESENT", "sk-test");
        let settings = EmbeddingSettings {
            api_key_env: "DOCQA_TEST_EMBED_KEY_PRESENT".to_string(),
            dimensions: 256,
            ..Default::default()
        };

        let embedder = OpenAIEmbedder::new(&settings).unwrap();
        assert_eq!(embedder.dimensions(), 256);
        assert_eq!(embedder.name(), "openai");
    }

    #[tokio::test]
    async fn test_empty_batch_skips_the_network() {
        std::env::set_var("DOCQA_TEST_EMBED_KEY_PRESENT", "sk-test");
        let settings = EmbeddingSettings {
            api_key_env: "DOCQA_TEST_EMBED_KEY_PRESENT".to_string(),
            api_base: "http://127.0.0.1:9/v1".to_string(),
            ..Default::default()
        };

        let embedder = OpenAIEmbedder::new(&settings).unwrap();
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_large_input_is_split_into_ordered_batches() {
        std::env::set_var("DOCQA_TEST_EMBED_KEY_PRESENT", "sk-test");
        let requests = Arc::new(AtomicUsize::new(0));
        let settings = EmbeddingSettings {
            api_key_env: "DOCQA_TEST_EMBED_KEY_PRESENT".to_string(),
            api_base: stub_endpoint(requests.clone()).await,
            dimensions: 2,
            ..Default::default()
        };
        let embedder = OpenAIEmbedder::new(&settings).unwrap();

        let texts: Vec<String> = (0..250).map(|i| format!("t{}", i)).collect();
        let embeddings = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(requests.load(Ordering::SeqCst), 3);
        assert_eq!(embeddings.len(), 250);
        for (i, embedding) in embeddings.iter().enumerate() {
            assert_eq!(embedding, &vec![i as f32, 1.0]);
        }
    }
}
