//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::{Context, Result};
use std::path::Path;

/// Run the ask command.
///
/// Ingests `files` into a fresh context, answers `question` from it, and
/// releases the context before returning, whether or not it succeeded.
pub async fn run_ask(
    question: &str,
    files: &[String],
    k: Option<usize>,
    show_chunks: bool,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'docqa doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let result = answer(&orchestrator, question, files, k, show_chunks).await;
    orchestrator.shutdown().await;
    result
}

async fn answer(
    orchestrator: &Orchestrator,
    question: &str,
    files: &[String],
    k: Option<usize>,
    show_chunks: bool,
) -> Result<()> {
    let context_id = orchestrator.create_context().to_string();

    let pb = Output::progress_bar(files.len() as u64, "Ingesting documents");
    let mut outcomes = Vec::with_capacity(files.len());

    for file in files {
        let path = Settings::expand_path(file);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.clone());
        pb.set_message(filename.clone());

        let bytes = match read_document(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                pb.abandon();
                return Err(e);
            }
        };
        outcomes.push(
            orchestrator
                .ingest(Some(context_id.as_str()), bytes, &filename)
                .await,
        );
        pb.inc(1);
    }
    pb.finish_and_clear();

    Output::header("Documents");
    for outcome in &outcomes {
        Output::ingest_result(outcome);
    }
    if outcomes.iter().any(|o| o.success) {
        println!();
        Output::context_summary(&orchestrator.get_context_status(&context_id)?);
    } else {
        Output::warning("No document could be ingested.");
    }

    let spinner = Output::spinner("Thinking...");
    let result = orchestrator
        .query(Some(context_id.as_str()), question, k)
        .await;
    spinner.finish_and_clear();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            Output::error(&format!("{}", e));
            return Err(e.into());
        }
    };

    println!("\n{}\n", outcome.answer);

    if let Some(error) = &outcome.error {
        Output::warning(error);
    }

    if !outcome.sources.is_empty() {
        Output::header("Sources");
        for source in &outcome.sources {
            Output::list_item(source);
        }
    }

    if show_chunks {
        for (i, chunk) in outcome.chunks.iter().enumerate() {
            Output::chunk_result(i + 1, chunk);
        }
        println!();
    }

    Ok(())
}

async fn read_document(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingProviderKind, IndexBackend};

    #[tokio::test]
    async fn test_unreadable_file_releases_scratch_space() {
        std::env::set_var("DOCQA_TEST_ASK_GENERATION_KEY", "gsk-test");
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");

        let good = dir.path().join("good.txt");
        std::fs::write(&good, "Refunds are issued within fourteen days.").unwrap();
        let missing = dir.path().join("missing.txt");

        let mut settings = Settings::default();
        settings.general.temp_dir = scratch.to_string_lossy().to_string();
        settings.vector_index.backend = IndexBackend::Sqlite;
        settings.embedding.providers = vec![EmbeddingProviderKind::Hashing];
        settings.generation.api_key_env = "DOCQA_TEST_ASK_GENERATION_KEY".to_string();

        let files = vec![
            good.to_string_lossy().to_string(),
            missing.to_string_lossy().to_string(),
        ];
        let result = run_ask("what?", &files, None, false, settings).await;

        assert!(result.is_err());
        let leaked: Vec<_> = std::fs::read_dir(&scratch)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("ctx-"))
            .collect();
        assert!(leaked.is_empty(), "{:?}", leaked);
    }
}
