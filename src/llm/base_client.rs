use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during LLM client operations.
#[derive(Error, Debug)]
pub enum LLMError {
    /// Error related to network requests (e.g., connection refused, timeout).
    #[error("HTTP request failed: {0}")]
    Network(reqwest::Error),
    /// Error reported by the LLM API (e.g., invalid request, rate limit).
    #[error("API request failed with status {status}: {body}")]
    ApiError { status: u16, body: String },
    /// The response body could not be decoded into the expected shape.
    #[error("Failed to parse response: {0}")]
    ParsingError(String),
    /// No API key is configured for the provider.
    #[error("No API key configured for provider '{0}'")]
    NoApiKey(Provider),
    /// The vendor string names a provider this tool cannot call.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
    /// The provider answered successfully but without any text.
    #[error("Provider returned an empty response")]
    EmptyResponse,
    /// Any other type of error.
    #[error("Other error: {0}")]
    Other(String),
}

impl LLMError {
    /// Whether a repeated request has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            LLMError::Network(_) => true,
            LLMError::ApiError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// The LLM vendors this tool knows how to call.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    OpenAI,
    Anthropic,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::OpenAI, Provider::Anthropic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    /// Environment variable consulted when the config file has no key.
    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = LLMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            _ => Err(LLMError::UnsupportedProvider(s.to_string())),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = LLMError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Provider> for String {
    fn from(provider: Provider) -> Self {
        provider.as_str().to_string()
    }
}

/// A single-turn request: one system prompt and one user message.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

/// Token accounting normalised across providers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// The text a provider produced for a `CompletionRequest`.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// Trait defining the interface for an LLM client.
///
/// Each provider speaks its own wire format; the tester only sees
/// `CompletionRequest` in and `Completion` out.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Sends one request and waits for the full (non-streamed) answer.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LLMError>;

    fn provider(&self) -> Provider;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse_is_case_insensitive() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAI);
        assert_eq!(" anthropic ".parse::<Provider>().unwrap(), Provider::Anthropic);
        match "gemini".parse::<Provider>() {
            Err(LLMError::UnsupportedProvider(name)) => assert_eq!(name, "gemini"),
            other => panic!("Expected UnsupportedProvider, got {:?}", other),
        }
    }

    #[test]
    fn test_provider_serde_uses_lowercase_names() {
        let provider: Provider = serde_json::from_str("\"Anthropic\"").unwrap();
        assert_eq!(provider, Provider::Anthropic);
        assert_eq!(serde_json::to_string(&Provider::OpenAI).unwrap(), "\"openai\"");
    }

    #[test]
    fn test_retryable_errors() {
        let rate_limited = LLMError::ApiError {
            status: 429,
            body: "slow down".to_string(),
        };
        let server_error = LLMError::ApiError {
            status: 503,
            body: String::new(),
        };
        let bad_request = LLMError::ApiError {
            status: 400,
            body: "bad model".to_string(),
        };
        assert!(rate_limited.is_retryable());
        assert!(server_error.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!LLMError::NoApiKey(Provider::OpenAI).is_retryable());
        assert!(!LLMError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }
}
