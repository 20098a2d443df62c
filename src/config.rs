//! Configuration types.
//!
//! Everything comes from environment variables. Board credentials are not
//! here: they arrive with each workflow request.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::board::trello;
use crate::error::ConfigError;
use crate::feed::x;
use crate::llm::{self, LlmConfig};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DB_PATH: &str = "./data/feedback-triage.db";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// X API app bearer token.
    pub x_bearer_token: SecretString,
    /// X API base URL.
    pub x_base_url: String,
    /// LLM settings for the classifier.
    pub llm: LlmConfig,
    /// Trello API base URL.
    pub trello_base_url: String,
    /// HTTP listen port.
    pub port: u16,
    /// libSQL database file.
    pub db_path: PathBuf,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let x_bearer_token = SecretString::from(required("X_BEARER_TOKEN")?);
        let gemini_api_key = SecretString::from(required("GEMINI_API_KEY")?);

        let port = match var("PIPELINE_PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "PIPELINE_PORT".into(),
                message: format!("'{raw}': {e}"),
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            x_bearer_token,
            x_base_url: var("X_API_BASE_URL").unwrap_or_else(|| x::DEFAULT_BASE_URL.to_string()),
            llm: LlmConfig {
                api_key: gemini_api_key,
                model: var("PIPELINE_MODEL").unwrap_or_else(|| llm::DEFAULT_MODEL.to_string()),
                base_url: var("GEMINI_API_BASE_URL"),
            },
            trello_base_url: var("TRELLO_API_BASE_URL")
                .unwrap_or_else(|| trello::DEFAULT_BASE_URL.to_string()),
            port,
            db_path: var("PIPELINE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
        })
    }
}
