//! docqa - Document question answering over isolated contexts
//!
//! Clients upload documents into a context, then ask questions answered from
//! the most relevant passages of those documents. Contexts are isolated from
//! each other and expire after a period of inactivity.
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `context` - Context store, temp resources and the expiry sweeper
//! - `extract` - Text extraction from txt, md, pdf, docx and pptx
//! - `chunking` - Overlapping character chunking
//! - `embedding` - Embedding providers and the fallback chain
//! - `vector_index` - Per-context nearest-neighbour indexes
//! - `generation` - Answer generation
//! - `pipeline` - Ingestion and query pipelines
//! - `orchestrator` - Service facade used by the CLI and HTTP server
//!
//! # Example
//!
//! ```rust,no_run
//! use docqa::config::Settings;
//! use docqa::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let bytes = std::fs::read("handbook.pdf")?;
//!     let ingested = orchestrator.ingest(None, bytes, "handbook.pdf").await;
//!     println!("Indexed {} chunks", ingested.chunk_count);
//!
//!     let context_id = ingested.context_id.to_string();
//!     let answer = orchestrator
//!         .query(Some(context_id.as_str()), "How many vacation days do I get?", None)
//!         .await?;
//!     println!("{}", answer.answer);
//!
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod openai;
pub mod orchestrator;
pub mod pipeline;
pub mod vector_index;

pub use error::{DocQaError, Result};
