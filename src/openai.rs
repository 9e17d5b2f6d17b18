//! OpenAI-compatible client configuration with sensible defaults.
//!
//! Both the embedding and generation adapters talk to OpenAI-compatible
//! endpoints (OpenAI itself, Groq, local gateways), so client construction
//! lives here.

use crate::error::{DocQaError, Result};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default timeout for API requests (2 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Connection parameters for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Base URL, e.g. `https://api.groq.com/openai/v1`.
    pub api_base: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Endpoint {
    /// Read the API key from the environment.
    ///
    /// A missing or empty key is a configuration error: providers fail loudly
    /// at construction instead of on the first request.
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            Ok(_) => Err(DocQaError::Config(format!("{} is empty", self.api_key_env))),
            Err(_) => Err(DocQaError::Config(format!("{} is not set", self.api_key_env))),
        }
    }
}

/// Create a client for the endpoint with the default timeout.
pub fn create_client(endpoint: &Endpoint) -> Result<Client<OpenAIConfig>> {
    create_client_with_timeout(endpoint, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create a client for the endpoint with a custom timeout.
pub fn create_client_with_timeout(
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<Client<OpenAIConfig>> {
    let api_key = endpoint.api_key()?;

    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DocQaError::Config(format!("Failed to create HTTP client: {}", e)))?;

    let config = OpenAIConfig::new()
        .with_api_base(endpoint.api_base.clone())
        .with_api_key(api_key);

    Ok(Client::with_config(config).with_http_client(http_client))
}
