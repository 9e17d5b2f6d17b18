//! Error types for docqa.

use thiserror::Error;

/// Library-level error type for docqa operations.
#[derive(Error, Debug)]
pub enum DocQaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    VectorIndex(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Context not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl DocQaError {
    /// Whether this error rejects the caller's input rather than reporting a failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, DocQaError::Validation(_) | DocQaError::UnsupportedFormat(_))
    }
}

/// Result type alias for docqa operations.
pub type Result<T> = std::result::Result<T, DocQaError>;
