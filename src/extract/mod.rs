//! Plain-text extraction from uploaded documents.
//!
//! Extraction is selected by file extension. Formats without extractable
//! content produce an empty string rather than an error; the ingestion
//! pipeline decides what "no text" means.

mod office;

use crate::error::{DocQaError, Result};
use std::path::Path;

/// Trait for turning raw document bytes into plain text.
///
/// Implementations are synchronous and CPU-bound; callers on the async
/// runtime should drive them through `spawn_blocking`.
pub trait TextExtractor: Send + Sync {
    /// Extract text from `bytes`, using `filename` to pick the format.
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String>;

    /// Lowercase extensions (without the dot) this extractor accepts.
    fn supported_extensions(&self) -> &[&'static str];

    /// Whether `filename` has a supported extension.
    fn supports(&self, filename: &str) -> bool {
        extension_of(filename)
            .map(|ext| self.supported_extensions().contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

/// Lowercased extension of `filename`, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

const SUPPORTED: &[&str] = &["txt", "md", "pdf", "docx", "pptx"];

/// Extractor for plain text, Markdown, PDF, DOCX and PPTX files.
#[derive(Debug, Default, Clone)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for DocumentExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String> {
        let ext = extension_of(filename).unwrap_or_default();

        match ext.as_str() {
            "txt" | "md" => Ok(String::from_utf8_lossy(bytes).into_owned()),
            "pdf" => office::extract_pdf(bytes),
            "docx" => office::extract_docx(bytes),
            "pptx" => office::extract_pptx(bytes),
            "doc" | "ppt" => Err(DocQaError::UnsupportedFormat(format!(
                "Legacy .{} files are not supported, convert to .{}x first",
                ext, ext
            ))),
            "" => Err(DocQaError::UnsupportedFormat(format!(
                "File {} has no extension",
                filename
            ))),
            other => Err(DocQaError::UnsupportedFormat(format!(
                "Unsupported file type .{} (supported: {})",
                other,
                SUPPORTED.join(", ")
            ))),
        }
    }

    fn supported_extensions(&self) -> &[&'static str] {
        SUPPORTED
    }
}
