//! Answer generation from an assembled prompt.

mod openai;

pub use openai::OpenAIGenerator;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A prompt ready for the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
}

/// Trait for text generation providers.
///
/// Errors are treated as transient per-query failures by callers.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Model identifier, for logs.
    fn model(&self) -> &str;
}
