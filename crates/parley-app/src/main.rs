//! Parley application binary - composition root.
//!
//! Ties together all Parley crates into a single executable:
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite database (migrations run on open)
//! 4. Build the inference client behind retry and circuit breaker
//! 5. Start the axum REST API server

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use parley_api::{routes, AppState};
use parley_core::config::ParleyConfig;
use parley_core::error::ParleyError;
use parley_inference::{InferenceClient, MockInference, OpenAiClient, ResilientInference};
use parley_storage::{Database, TranscriptRepository};

use crate::cli::CliArgs;

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Build the configured inference provider.
///
/// Real providers sit behind [`ResilientInference`]; the mock is local and
/// never fails transiently, so it is used bare.
fn build_inference(config: &ParleyConfig) -> Result<Arc<dyn InferenceClient>, ParleyError> {
    match config.inference.provider.as_str() {
        "mock" => {
            tracing::warn!(
                dim = config.inference.embedding_dim,
                "Using mock inference provider; extraction output is heuristic"
            );
            Ok(Arc::new(MockInference::new(config.inference.embedding_dim)))
        }
        "openai" => {
            let key = config.inference.api_key.as_deref().ok_or_else(|| {
                ParleyError::Config(
                    "OPENAI_API_KEY is not set and inference.api_key is empty".to_string(),
                )
            })?;
            let client = OpenAiClient::new(&config.inference, key)
                .map_err(|e| ParleyError::Config(e.to_string()))?;
            tracing::info!(
                base_url = %config.inference.base_url,
                chat_model = %config.inference.chat_model,
                embedding_model = %config.inference.embedding_model,
                "OpenAI-compatible inference client ready"
            );
            Ok(Arc::new(ResilientInference::new(client, &config.retry)))
        }
        other => Err(ParleyError::Config(format!(
            "Unknown inference provider '{}' (expected \"openai\" or \"mock\")",
            other
        ))),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Loaded before tracing so the configured log level applies.
    let config_file = args.resolve_config_path();
    let loaded = if config_file.exists() {
        Some(ParleyConfig::load(&config_file))
    } else {
        None
    };
    let base = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => ParleyConfig::default(),
    };
    let config = args.apply(base);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Some(Ok(_)) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(Err(e)) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
        None => tracing::info!(
            path = %config_file.display(),
            "No config file found, using defaults"
        ),
    }

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join("parley.db");
    let db = Arc::new(Database::new(&db_path)?);
    let stored = TranscriptRepository::new(Arc::clone(&db)).count()?;
    tracing::info!(path = %db_path.display(), transcripts = stored, "SQLite database opened");

    // Inference.
    let client = match build_inference(&config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialise inference provider");
            return Err(e.into());
        }
    };

    if config.server.api_token.is_none() {
        tracing::warn!("No API token configured; /api routes are unauthenticated");
    }

    // === API server ===

    let state = AppState::new(config.clone(), db, client);
    routes::start_server(&config, state).await?;

    Ok(())
}
