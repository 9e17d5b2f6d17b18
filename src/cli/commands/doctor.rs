//! Doctor command - verify configuration and provider reachability.

use crate::cli::preflight::{embedding_endpoint, generation_endpoint};
use crate::cli::Output;
use crate::config::{EmbeddingProviderKind, IndexBackend, Settings};
use crate::openai::Endpoint;
use console::style;
use std::path::Path;
use std::time::Duration;

const PROBE_TIMEOUT_SECS: u64 = 5;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings, config_path: Option<&Path>) -> anyhow::Result<()> {
    Output::header("docqa Doctor");
    println!();
    println!("Checking configuration and providers...\n");

    let mut checks = Vec::new();

    println!("{}", style("API Configuration").bold());
    let generation = generation_endpoint(settings);
    let mut api_checks = vec![check_api_key("Generation key", &generation)];
    api_checks.push(check_embedding_chain(settings));
    for check in &api_checks {
        check.print();
    }
    checks.extend(api_checks);

    println!();

    println!("{}", style("Endpoints").bold());
    let mut endpoint_checks = vec![probe_endpoint("Generation endpoint", &generation).await];
    if settings.embedding.providers.contains(&EmbeddingProviderKind::OpenAI) {
        endpoint_checks.push(probe_endpoint("Embedding endpoint", &embedding_endpoint(settings)).await);
    }
    for check in &endpoint_checks {
        check.print();
    }
    checks.extend(endpoint_checks);

    println!();

    println!("{}", style("Directories").bold());
    let dir_check = check_temp_dir(settings);
    dir_check.print();
    checks.push(dir_check);

    println!();

    println!("{}", style("Configuration").bold());
    let config_check = check_config_file(config_path);
    config_check.print();
    checks.push(config_check);
    Output::kv("Generation model", &settings.generation.model);
    Output::kv(
        "Index",
        match settings.vector_index.backend {
            IndexBackend::Memory => "memory",
            IndexBackend::Sqlite => "sqlite",
        },
    );
    Output::kv("Context expiry", &format!("{}s idle", settings.contexts.max_idle_secs));

    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using docqa.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! docqa is ready to use.");
    }

    Ok(())
}

fn check_api_key(name: &str, endpoint: &Endpoint) -> CheckResult {
    match endpoint.api_key() {
        Ok(key) => CheckResult::ok(
            name,
            &format!("{} configured ({})", endpoint.api_key_env, mask_key(&key)),
        ),
        Err(e) => CheckResult::error(
            name,
            &e.to_string(),
            &format!("Set with: export {}='...'", endpoint.api_key_env),
        ),
    }
}

/// Report which embedding provider the configured chain will pick.
fn check_embedding_chain(settings: &Settings) -> CheckResult {
    let endpoint = embedding_endpoint(settings);
    let mut skipped = Vec::new();

    for kind in &settings.embedding.providers {
        let available = match kind {
            EmbeddingProviderKind::OpenAI => endpoint.api_key().is_ok(),
            EmbeddingProviderKind::Hashing => true,
        };
        if available {
            let message = format!("{} ({} dimensions)", kind, settings.embedding.dimensions);
            return if skipped.is_empty() {
                CheckResult::ok("Embeddings", &message)
            } else {
                CheckResult::warning(
                    "Embeddings",
                    &format!("{}, skipped {}", message, skipped.join(", ")),
                    &format!("Set {} to use remote embeddings", endpoint.api_key_env),
                )
            };
        }
        skipped.push(kind.to_string());
    }

    CheckResult::error(
        "Embeddings",
        "no provider can start",
        &format!(
            "Set {} or add \"hashing\" to embedding.providers",
            endpoint.api_key_env
        ),
    )
}

/// Hit `GET {api_base}/models` to see whether the endpoint answers.
async fn probe_endpoint(name: &str, endpoint: &Endpoint) -> CheckResult {
    let key = match endpoint.api_key() {
        Ok(key) => key,
        Err(_) => {
            return CheckResult::warning(name, "skipped (no API key)", "Set the API key first")
        }
    };

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
        .build()
    {
        Ok(client) => client,
        Err(e) => return CheckResult::error(name, &e.to_string(), "Check TLS configuration"),
    };

    let url = format!("{}/models", endpoint.api_base.trim_end_matches('/'));
    match client.get(&url).bearer_auth(key).send().await {
        Ok(response) if response.status().is_success() => {
            CheckResult::ok(name, &endpoint.api_base)
        }
        Ok(response) if response.status() == reqwest::StatusCode::UNAUTHORIZED => {
            CheckResult::error(
                name,
                "API key rejected (401)",
                &format!("Check the value of {}", endpoint.api_key_env),
            )
        }
        Ok(response) => CheckResult::warning(
            name,
            &format!("{} answered {}", endpoint.api_base, response.status()),
            "The endpoint may not list models; requests can still work",
        ),
        Err(e) => CheckResult::error(
            name,
            &format!("unreachable: {}", e),
            "Check the api_base setting and your network",
        ),
    }
}

fn check_temp_dir(settings: &Settings) -> CheckResult {
    let temp_dir = settings.temp_dir();
    match std::fs::create_dir_all(&temp_dir).and_then(|_| tempfile::tempfile_in(&temp_dir)) {
        Ok(_) => CheckResult::ok("Temp directory", &temp_dir.display().to_string()),
        Err(e) => CheckResult::error(
            "Temp directory",
            &format!("{} ({})", temp_dir.display(), e),
            "Set general.temp_dir to a writable directory",
        ),
    }
}

fn check_config_file(config_path: Option<&Path>) -> CheckResult {
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Settings::default_config_path);
    if config_path.exists() {
        CheckResult::ok("Config file", &config_path.display().to_string())
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: docqa config init",
        )
    }
}

/// Show only the ends of a key.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result_error() {
        let result = CheckResult::error("test", "failed", "fix it");
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.hint, Some("fix it".to_string()));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("short"), "***");
        assert_eq!(mask_key("gsk_abcdefghijklmnop"), "gsk_...mnop");
    }

    #[test]
    fn test_embedding_chain_reports_fallback() {
        let mut settings = Settings::default();
        settings.embedding.api_key_env = "DOCQA_DOCTOR_NEVER_SET".to_string();

        let result = check_embedding_chain(&settings);
        assert_eq!(result.status, CheckStatus::Warning);
        assert!(result.message.starts_with("hashing"));

        settings.embedding.providers = vec![EmbeddingProviderKind::OpenAI];
        assert_eq!(check_embedding_chain(&settings).status, CheckStatus::Error);
    }

    #[tokio::test]
    async fn test_probe_without_key_is_skipped() {
        let endpoint = Endpoint {
            api_base: "http://127.0.0.1:9/v1".to_string(),
            api_key_env: "DOCQA_DOCTOR_NEVER_SET".to_string(),
        };
        let result = probe_endpoint("Generation endpoint", &endpoint).await;
        assert_eq!(result.status, CheckStatus::Warning);
    }
}
