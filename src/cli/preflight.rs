//! Pre-flight checks before starting the service.
//!
//! Validates that required configuration is available before starting
//! operations that would otherwise fail midway.

use crate::config::{EmbeddingProviderKind, Settings};
use crate::error::{DocQaError, Result};
use crate::openai::Endpoint;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// A one-shot question needs every provider and a scratch directory.
    Ask,
    /// The server needs the same, plus a usable upload limit.
    Serve,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    check_generation_key(settings)?;
    check_embedding_chain(settings)?;
    check_temp_dir(settings)?;

    if let Operation::Serve = operation {
        if settings.server.max_upload_bytes == 0 {
            return Err(DocQaError::Config(
                "server.max_upload_bytes must be > 0".to_string(),
            ));
        }
    }
    Ok(())
}

/// Endpoint used for answer generation.
pub fn generation_endpoint(settings: &Settings) -> Endpoint {
    Endpoint {
        api_base: settings.generation.api_base.clone(),
        api_key_env: settings.generation.api_key_env.clone(),
    }
}

/// Endpoint used by the remote embedding provider.
pub fn embedding_endpoint(settings: &Settings) -> Endpoint {
    Endpoint {
        api_base: settings.embedding.api_base.clone(),
        api_key_env: settings.embedding.api_key_env.clone(),
    }
}

fn check_generation_key(settings: &Settings) -> Result<()> {
    generation_endpoint(settings).api_key().map(|_| ()).map_err(|_| {
        DocQaError::Config(format!(
            "{} not set. Set it with: export {}='...'",
            settings.generation.api_key_env, settings.generation.api_key_env
        ))
    })
}

/// At least one configured embedding provider must be able to start.
fn check_embedding_chain(settings: &Settings) -> Result<()> {
    let usable = settings.embedding.providers.iter().any(|kind| match kind {
        EmbeddingProviderKind::OpenAI => embedding_endpoint(settings).api_key().is_ok(),
        EmbeddingProviderKind::Hashing => true,
    });

    if usable {
        Ok(())
    } else {
        Err(DocQaError::Config(format!(
            "No embedding provider can start. Set {} or add \"hashing\" to embedding.providers",
            settings.embedding.api_key_env
        )))
    }
}

fn check_temp_dir(settings: &Settings) -> Result<()> {
    let temp_dir = settings.temp_dir();
    std::fs::create_dir_all(&temp_dir).map_err(|e| {
        DocQaError::Config(format!("Cannot create temp dir {}: {}", temp_dir.display(), e))
    })?;
    tempfile::tempfile_in(&temp_dir).map_err(|e| {
        DocQaError::Config(format!("Temp dir {} is not writable: {}", temp_dir.display(), e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_in(dir: &tempfile::TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.general.temp_dir = dir.path().join("scratch").to_string_lossy().to_string();
        settings.generation.api_key_env = "DOCQA_PREFLIGHT_GEN_KEY".to_string();
        settings.embedding.api_key_env = "DOCQA_PREFLIGHT_NEVER_SET".to_string();
        settings
    }

    #[test]
    fn test_missing_generation_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(&dir);
        settings.generation.api_key_env = "DOCQA_PREFLIGHT_NEVER_SET".to_string();

        let err = check(Operation::Ask, &settings).unwrap_err();
        assert!(err.to_string().contains("DOCQA_PREFLIGHT_NEVER_SET"));
    }

    #[test]
    fn test_embedding_chain_falls_back_to_hashing() {
        std::env::set_var("DOCQA_PREFLIGHT_GEN_KEY", "gsk-test");
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(&dir);

        assert!(check(Operation::Serve, &settings).is_ok());
        assert!(dir.path().join("scratch").is_dir());

        settings.embedding.providers = vec![EmbeddingProviderKind::OpenAI];
        assert!(check(Operation::Ask, &settings).is_err());
    }

    #[test]
    fn test_serve_rejects_zero_upload_limit() {
        std::env::set_var("DOCQA_PREFLIGHT_GEN_KEY", "gsk-test");
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(&dir);
        settings.server.max_upload_bytes = 0;

        assert!(check(Operation::Ask, &settings).is_ok());
        assert!(check(Operation::Serve, &settings).is_err());
    }
}
