//! CLI output formatting utilities.

use crate::context::ContextSummary;
use crate::pipeline::IngestOutcome;
use crate::vector_index::ScoredChunk;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print the result of ingesting one file.
    pub fn ingest_result(outcome: &IngestOutcome) {
        if outcome.success {
            println!(
                "  {} {} ({} chunks)",
                style("✓").green(),
                style(&outcome.filename).bold(),
                outcome.chunks_added
            );
        } else {
            println!(
                "  {} {} - {}",
                style("✗").red(),
                style(&outcome.filename).bold(),
                outcome.message
            );
        }
    }

    /// Print a retrieved chunk.
    pub fn chunk_result(rank: usize, scored: &ScoredChunk) {
        println!(
            "\n{} [{}] {} #{} (relevance: {:.0}%)",
            style(">>").green(),
            rank,
            style(&scored.chunk.source_filename).bold(),
            scored.chunk.position,
            scored.similarity * 100.0
        );
        println!("   {}", content_preview(&scored.chunk.text, 200));
    }

    /// Print a context summary.
    pub fn context_summary(summary: &ContextSummary) {
        Output::kv("Context", &summary.context_id.to_string());
        Output::kv("Chunks", &summary.chunk_count.to_string());
        Output::kv("Sources", &summary.sources.join(", "));
    }

    /// Create a progress bar.
    pub fn progress_bar(len: u64, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        if let Ok(template) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(template.progress_chars("#>-"));
        }
        pb.set_message(msg.to_string());
        pb
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(template);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Collapse newlines and truncate with an ellipsis on a char boundary.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let truncated: String = content.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
