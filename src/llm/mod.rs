//! LLM integration.
//!
//! The classifier talks to models through the `LlmProvider` trait. The
//! backend is Google Gemini via rig-core, bridged by `RigAdapter`.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use rig::providers::gemini;
use secrecy::ExposeSecret;

use crate::error::LlmError;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Override for the API host (proxies, tests).
    pub base_url: Option<String>,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.model.trim().is_empty() {
        return Err(LlmError::RequestFailed {
            provider: "gemini".to_string(),
            reason: "model name is empty".to_string(),
        });
    }

    let client_error = |e: &dyn std::fmt::Display| LlmError::RequestFailed {
        provider: "gemini".to_string(),
        reason: format!("Failed to create Gemini client: {}", e),
    };
    let client = match config.base_url.as_deref() {
        Some(url) => gemini::Client::builder()
            .api_key(config.api_key.expose_secret())
            .base_url(url)
            .build()
            .map_err(|e| client_error(&e))?,
        None => gemini::Client::new(config.api_key.expose_secret()).map_err(|e| client_error(&e))?,
    };

    let model = client.completion_model(&config.model);
    tracing::info!("Using Gemini (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_constructs_without_network() {
        // rig-core clients accept any string as API key at construction time.
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("test-key"),
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), DEFAULT_MODEL);
    }

    #[test]
    fn test_create_provider_with_base_url() {
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("test-key"),
            model: "gemini-1.5-pro".to_string(),
            base_url: Some("http://127.0.0.1:9".to_string()),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gemini-1.5-pro");
    }

    #[test]
    fn test_create_provider_rejects_empty_model() {
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("test-key"),
            model: "  ".to_string(),
            base_url: None,
        };
        assert!(create_provider(&config).is_err());
    }
}
