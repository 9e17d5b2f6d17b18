//! Configuration module for docqa.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, QaPrompts};
pub use settings::{
    ChunkingSettings, ContextSettings, EmbeddingProviderKind, EmbeddingSettings,
    GeneralSettings, GenerationSettings, IndexBackend, MetricSetting, PromptSettings,
    ServerSettings, Settings, VectorIndexSettings,
};
