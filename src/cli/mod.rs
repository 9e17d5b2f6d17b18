//! CLI module for docqa.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// docqa - Document question answering
///
/// Upload documents into isolated, expiring contexts and ask questions
/// answered from their content.
#[derive(Parser, Debug)]
#[command(name = "docqa")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "DOCQA_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check configuration and provider availability
    Doctor,

    /// Answer a question from local documents in a throwaway context
    Ask {
        /// The question to ask
        question: String,

        /// Documents to ingest before asking (txt, md, pdf, docx, pptx)
        #[arg(short, long = "file", required = true)]
        files: Vec<String>,

        /// Number of chunks to retrieve
        #[arg(short)]
        k: Option<usize>,

        /// Print the retrieved chunks as well as the answer
        #[arg(long)]
        show_chunks: bool,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the current configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show configuration file path
    Path,
}
