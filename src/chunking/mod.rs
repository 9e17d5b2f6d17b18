//! Text chunking for breaking extracted documents into retrievable segments.
//!
//! Chunks have a fixed target size and a fixed overlap between neighbours,
//! both taken from configuration rather than computed from the document.

mod character;

pub use character::CharacterChunker;

use crate::config::ChunkingSettings;
use crate::context::ContextId;
use serde::{Deserialize, Serialize};

/// A span of document text with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Text content of this chunk.
    pub text: String,
    /// Name of the document this chunk came from.
    pub source_filename: String,
    /// Context the chunk belongs to.
    pub context_id: ContextId,
    /// Order of this chunk within its document.
    pub position: usize,
}

/// Configuration for chunking, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl From<&ChunkingSettings> for ChunkingConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
        }
    }
}

/// Trait for text chunking implementations.
pub trait Chunker: Send + Sync {
    /// Split text into chunk texts, in document order.
    fn split(&self, text: &str) -> Vec<String>;

    /// Split a document and attach provenance to each piece.
    fn chunk_document(&self, text: &str, source_filename: &str, context_id: ContextId) -> Vec<Chunk> {
        self.split(text)
            .into_iter()
            .enumerate()
            .map(|(position, text)| Chunk {
                text,
                source_filename: source_filename.to_string(),
                context_id,
                position,
            })
            .collect()
    }
}
