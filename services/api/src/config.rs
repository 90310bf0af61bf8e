//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which text-generation backend to wire up at startup.
///
/// Parsed exactly once from `AI_PROVIDER`; everything downstream works
/// against the `TextGeneration` trait and never branches on this again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub provider: ProviderKind,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub gmail_access_token: String,
    pub max_threads_per_batch: usize,
    /// Cap on persisted reference threads; `None` means unlimited.
    pub max_reference_threads: Option<usize>,
    pub max_fetch_results: usize,
    pub provider_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Select the Generation Provider ---
        let provider_str =
            std::env::var("AI_PROVIDER").unwrap_or_else(|_| "anthropic".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "openai" => ProviderKind::OpenAi,
            "anthropic" => ProviderKind::Anthropic,
            other => {
                return Err(ConfigError::InvalidValue(
                    "AI_PROVIDER".to_string(),
                    format!("'{}' is not 'openai' or 'anthropic'", other),
                ))
            }
        };

        // --- Load API Keys (as optional; checked at adapter construction) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY").ok();

        let openai_model =
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let anthropic_model = std::env::var("ANTHROPIC_MODEL")
            .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string());

        let gmail_access_token = std::env::var("GMAIL_ACCESS_TOKEN")
            .map_err(|_| ConfigError::MissingVar("GMAIL_ACCESS_TOKEN".to_string()))?;

        // --- Load Pipeline Tunables ---
        let max_threads_per_batch = parse_var("MAX_THREADS_PER_BATCH", 50)?;
        // 0 means no cap on persisted references.
        let max_reference_threads = match parse_var("REPORT_MAX_REFERENCES", 20)? {
            0 => None,
            n => Some(n),
        };
        let max_fetch_results = parse_var("MAX_FETCH_RESULTS", 100)?;
        let provider_timeout =
            Duration::from_secs(parse_var("PROVIDER_TIMEOUT_SECS", 60)? as u64);

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            provider,
            openai_api_key,
            openai_model,
            anthropic_api_key,
            anthropic_model,
            gmail_access_token,
            max_threads_per_batch,
            max_reference_threads,
            max_fetch_results,
            provider_timeout,
        })
    }
}

fn parse_var(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<usize>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
    }
}
