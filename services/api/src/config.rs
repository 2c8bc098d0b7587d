//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
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

/// What the message workflow does when an inference upstream fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpstreamFailurePolicy {
    /// Substitute the fixed fallback text and log the cause.
    Fallback,
    /// Fail the request with `502` naming the failed stage.
    Surface,
}

impl std::str::FromStr for UpstreamFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fallback" => Ok(Self::Fallback),
            "surface" => Ok(Self::Surface),
            other => Err(format!("'{}' is not one of fallback, surface", other)),
        }
    }
}

/// Base URLs of the three inference deployments, one per model tier.
#[derive(Clone, Debug)]
pub struct ModelUrls {
    pub premium: String,
    pub economical: String,
    pub default: String,
}

impl Default for ModelUrls {
    fn default() -> Self {
        Self {
            premium: "https://mindspark121-Fastapi-Pyschiatry-HybridApproch.hf.space".to_string(),
            economical: "https://mindspark121-fastapi-psychiatry-simplerag.hf.space".to_string(),
            default: "https://mindspark121-fastapi-pyschiatry-deepseek.hf.space".to_string(),
        }
    }
}

pub const DEFAULT_TRANSCRIPTION_URL: &str =
    "https://api-inference.huggingface.co/models/openai/whisper-small";

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When unset the service keeps its data in memory.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub jwt_secret: String,
    pub hf_access_token: Option<String>,
    pub transcription_url: String,
    pub model_urls: ModelUrls,
    pub upstream_timeout: Duration,
    pub upstream_failure_policy: UpstreamFailurePolicy,
    pub reports_dir: PathBuf,
    pub assets_dir: PathBuf,
    /// Prefix of the report download links handed to the client.
    pub public_base_url: String,
    /// Prefix of the frontend share links.
    pub share_base_url: String,
    pub cors_origin: String,
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
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Load Server and Database Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:5000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Secrets ---
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("JWT_SECRET".to_string()))?;
        let hf_access_token = lookup("HF_ACCESS_TOKEN");

        // --- Load Upstream Settings ---
        let transcription_url = var_or("TRANSCRIPTION_URL", DEFAULT_TRANSCRIPTION_URL);
        let defaults = ModelUrls::default();
        let model_urls = ModelUrls {
            premium: var_or("MODEL_URL_PREMIUM", &defaults.premium),
            economical: var_or("MODEL_URL_ECONOMICAL", &defaults.economical),
            default: var_or("MODEL_URL_DEFAULT", &defaults.default),
        };

        let timeout_str = var_or("UPSTREAM_TIMEOUT_SECS", "60");
        let timeout_secs = timeout_str
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "UPSTREAM_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                )
            })?;

        let upstream_failure_policy = var_or("UPSTREAM_FAILURE_POLICY", "fallback")
            .parse::<UpstreamFailurePolicy>()
            .map_err(|e| ConfigError::InvalidValue("UPSTREAM_FAILURE_POLICY".to_string(), e))?;

        // --- Load Report and Link Settings ---
        let reports_dir = PathBuf::from(var_or("REPORTS_DIR", "./generated_reports"));
        let assets_dir = PathBuf::from(var_or("ASSETS_DIR", "."));
        let public_base_url = var_or("PUBLIC_BASE_URL", "http://localhost:5000");
        let share_base_url = var_or("SHARE_BASE_URL", "http://localhost:3000");
        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            jwt_secret,
            hf_access_token,
            transcription_url,
            model_urls,
            upstream_timeout: Duration::from_secs(timeout_secs),
            upstream_failure_policy,
            reports_dir,
            assets_dir,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            share_base_url: share_base_url.trim_end_matches('/').to_string(),
            cors_origin,
        })
    }
}
