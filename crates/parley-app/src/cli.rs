//! CLI argument definitions for the Parley server.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use parley_core::config::ParleyConfig;

/// Parley - meeting transcript ingestion, knowledge extraction, and semantic search.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server bind address.
    #[arg(long = "host")]
    pub host: Option<String>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Data directory for the SQLite database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Inference provider: "openai" or "mock".
    #[arg(long = "provider")]
    pub provider: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PARLEY_CONFIG env var > ~/.parley/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PARLEY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > PARLEY_PORT env var > config file value > 3000.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("PARLEY_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        if config_port != 0 {
            return config_port;
        }
        3000
    }

    /// Resolve the data directory.
    ///
    /// Priority: --data-dir flag > PARLEY_DATA_DIR env var > config file value.
    pub fn resolve_data_dir(&self, config_dir: &str) -> String {
        if let Some(ref p) = self.data_dir {
            return p.to_string_lossy().to_string();
        }
        if let Ok(p) = std::env::var("PARLEY_DATA_DIR") {
            if !p.trim().is_empty() {
                return p;
            }
        }
        config_dir.to_string()
    }

    /// Resolve the inference API key.
    ///
    /// Priority: OPENAI_API_KEY env var > config file value.
    pub fn resolve_api_key(&self, config_key: Option<&str>) -> Option<String> {
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| config_key.map(str::to_string))
    }

    /// Resolve the bearer token guarding `/api/*`.
    ///
    /// Priority: PARLEY_API_TOKEN env var > config file value. `None` leaves
    /// the API open.
    pub fn resolve_api_token(&self, config_token: Option<&str>) -> Option<String> {
        std::env::var("PARLEY_API_TOKEN")
            .ok()
            .or_else(|| config_token.map(str::to_string))
            .filter(|t| !t.trim().is_empty())
    }

    /// Apply every override onto a loaded configuration.
    pub fn apply(&self, mut config: ParleyConfig) -> ParleyConfig {
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        config.server.port = self.resolve_port(config.server.port);
        config.general.data_dir = self.resolve_data_dir(&config.general.data_dir);
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(ref provider) = self.provider {
            config.inference.provider = provider.clone();
        }
        config.inference.api_key = self.resolve_api_key(config.inference.api_key.as_deref());
        config.server.api_token = self.resolve_api_token(config.server.api_token.as_deref());
        config
    }
}

/// Default config file path: `~/.parley/config.toml`.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    PathBuf::from("config.toml")
}
