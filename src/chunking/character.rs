//! Character-window chunking implementation.
//!
//! Walks the text in windows of `chunk_size` characters. Each window is
//! shortened to the last paragraph, line or word break in its second half
//! when one exists, and the next window starts `chunk_overlap` characters
//! before the previous one ended.

use super::{Chunker, ChunkingConfig};

/// Break points, most preferred first.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Fixed-size, fixed-overlap chunker measured in characters.
pub struct CharacterChunker {
    config: ChunkingConfig,
}

impl CharacterChunker {
    /// Create a chunker. `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(config: ChunkingConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        Self {
            config: ChunkingConfig {
                chunk_size,
                chunk_overlap: config.chunk_overlap.min(chunk_size - 1),
            },
        }
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Find a break in `(floor, end]` (character indices) and return the
    /// character index just past the separator.
    fn find_break(&self, text: &str, bounds: &[usize], floor: usize, end: usize) -> Option<usize> {
        let window = &text[bounds[floor]..bounds[end]];
        for sep in SEPARATORS {
            if let Some(pos) = window.rfind(sep) {
                let byte = bounds[floor] + pos + sep.len();
                // bounds is sorted; the separator is ASCII so `byte` is a char boundary
                if let Ok(idx) = bounds.binary_search(&byte) {
                    if idx > floor {
                        return Some(idx);
                    }
                }
            }
        }
        None
    }
}

impl Default for CharacterChunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

impl Chunker for CharacterChunker {
    fn split(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let ChunkingConfig {
            chunk_size,
            chunk_overlap,
        } = self.config;

        // bounds[i] is the byte offset of character i; the last entry is text.len()
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total_chars = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let mut end = (start + chunk_size).min(total_chars);

            if end < total_chars {
                // Never shrink a window so far that the overlap would stall progress.
                let floor = start + (chunk_size / 2).max(chunk_overlap + 1);
                if floor < end {
                    if let Some(brk) = self.find_break(text, &bounds, floor, end) {
                        end = brk;
                    }
                }
            }

            let piece = text[bounds[start]..bounds[end]].trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }

            if end >= total_chars {
                break;
            }
            start = end.saturating_sub(chunk_overlap).max(start + 1);
        }

        chunks
    }
}
