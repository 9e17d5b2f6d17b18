//! Configuration settings for docqa.

use crate::error::{DocQaError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub vector_index: VectorIndexSettings,
    pub generation: GenerationSettings,
    pub contexts: ContextSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for per-context scratch files.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir()
                .join("docqa")
                .to_string_lossy()
                .into_owned(),
            log_level: "info".to_string(),
        }
    }
}

/// Text chunking settings, in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Target chunk size.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Embedding provider kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// OpenAI-compatible embeddings endpoint.
    #[serde(alias = "openai-compatible")]
    OpenAI,
    /// Local feature-hashing embedder (no network).
    Hashing,
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "openai-compatible" => Ok(EmbeddingProviderKind::OpenAI),
            "hashing" | "local" => Ok(EmbeddingProviderKind::Hashing),
            _ => Err(format!("Unknown embedding provider: {}", s)),
        }
    }
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProviderKind::OpenAI => write!(f, "openai"),
            EmbeddingProviderKind::Hashing => write!(f, "hashing"),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Providers to try, in order. The first one that can be constructed wins.
    pub providers: Vec<EmbeddingProviderKind>,
    /// Embedding model for remote providers.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// API base URL for remote providers.
    pub api_base: String,
    /// Environment variable holding the API key for remote providers.
    pub api_key_env: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            providers: vec![EmbeddingProviderKind::OpenAI, EmbeddingProviderKind::Hashing],
            model: "text-embedding-3-small".to_string(),
            dimensions: 384,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Vector index backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// In-memory brute-force index.
    #[default]
    Memory,
    /// SQLite database in the context's scratch directory.
    Sqlite,
}

/// Distance metric setting (mirrors [`crate::vector_index::DistanceMetric`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricSetting {
    #[default]
    Cosine,
    L2,
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VectorIndexSettings {
    /// Index backend (memory, sqlite).
    pub backend: IndexBackend,
    /// Distance metric (cosine, l2).
    pub metric: MetricSetting,
}

/// Answer generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Chat model used to answer questions.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// API base URL of the OpenAI-compatible chat endpoint.
    pub api_base: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "llama3-70b-8192".to_string(),
            temperature: 0.2,
            api_base: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Context lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// How often the expiry sweep runs.
    pub sweep_interval_secs: u64,
    /// Idle time after which a context expires.
    pub max_idle_secs: u64,
    /// Number of chunks retrieved per question when the caller does not say.
    pub default_k: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60 * 60,
            max_idle_secs: 24 * 60 * 60,
            default_k: 4,
        }
    }
}

impl ContextSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Maximum upload body size in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| DocQaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the pipelines cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(DocQaError::Config("chunking.chunk_size must be > 0".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(DocQaError::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.embedding.providers.is_empty() {
            return Err(DocQaError::Config(
                "embedding.providers must list at least one provider".to_string(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(DocQaError::Config("embedding.dimensions must be > 0".to_string()));
        }
        if self.contexts.sweep_interval_secs == 0 || self.contexts.max_idle_secs == 0 {
            return Err(DocQaError::Config(
                "contexts.sweep_interval_secs and contexts.max_idle_secs must be > 0".to_string(),
            ));
        }
        if self.contexts.default_k == 0 {
            return Err(DocQaError::Config("contexts.default_k must be > 0".to_string()));
        }
        for (key, base) in [
            ("embedding.api_base", &self.embedding.api_base),
            ("generation.api_base", &self.generation.api_base),
        ] {
            url::Url::parse(base)
                .map_err(|e| DocQaError::Config(format!("{} is not a valid URL: {}", key, e)))?;
        }
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docqa")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }
}
