//! # LLM Module
//!
//! Provides the `LLMClient` trait and the OpenAI and Anthropic clients the
//! tester calls. `ClientRegistry` holds one client per provider that has a key.

pub mod anthropic_client;
pub mod base_client;
pub mod openai_client;

pub use anthropic_client::AnthropicClient;
pub use base_client::{
    Completion, CompletionRequest, LLMClient, LLMError, Provider, TokenUsage,
};
pub use openai_client::OpenAIClient;

use crate::config::Config;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Provider clients built from the configuration.
#[derive(Default, Clone)]
pub struct ClientRegistry {
    clients: HashMap<Provider, Arc<dyn LLMClient>>,
}

impl ClientRegistry {
    /// Builds a client for every provider that has an API key.
    ///
    /// Providers without a key are left out; asking for them later yields
    /// `LLMError::NoApiKey` so only the cases that need them fail.
    pub fn from_config(config: &Config) -> Result<Self, LLMError> {
        let mut registry = Self::default();
        let timeout = config.request_timeout();

        for provider in Provider::ALL {
            let Some(api_key) = config.api_key(provider) else {
                warn!("No API key configured for {}; its prompts will fail.", provider);
                continue;
            };
            let base_url = config.base_url(provider);
            let client: Arc<dyn LLMClient> = match provider {
                Provider::OpenAI => Arc::new(OpenAIClient::new(Some(api_key), base_url, timeout)?),
                Provider::Anthropic => {
                    Arc::new(AnthropicClient::new(Some(api_key), base_url, timeout)?)
                }
            };
            info!("Initialized {} client.", provider);
            registry = registry.with_client(client);
        }

        Ok(registry)
    }

    pub fn with_client(mut self, client: Arc<dyn LLMClient>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn LLMClient>, LLMError> {
        self.clients
            .get(&provider)
            .cloned()
            .ok_or(LLMError::NoApiKey(provider))
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_only_builds_configured_providers() {
        let config: Config = serde_json::from_str(r#"{ "openai_key": "sk-openai" }"#).unwrap();
        let config = config.with_env_lookup(|_| None);
        let registry = ClientRegistry::from_config(&config).unwrap();

        assert_eq!(registry.get(Provider::OpenAI).unwrap().provider(), Provider::OpenAI);
        match registry.get(Provider::Anthropic) {
            Err(LLMError::NoApiKey(Provider::Anthropic)) => {}
            Err(other) => panic!("Expected NoApiKey, got {:?}", other),
            Ok(_) => panic!("Anthropic client should not exist without a key"),
        }
    }

    #[test]
    fn test_registry_empty_without_keys() {
        let config: Config = serde_json::from_str("{}").unwrap();
        let config = config.with_env_lookup(|_| None);
        let registry = ClientRegistry::from_config(&config).unwrap();
        assert!(registry.is_empty());
    }
}
