use super::base_client::{
    Completion, CompletionRequest, LLMClient, LLMError, Provider, TokenUsage,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

// Anthropic specific structs

#[derive(Serialize, Debug)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct AnthropicChatRequest<'a> {
    model: &'a str,
    messages: [AnthropicMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize, Debug, Clone)]
struct AnthropicChatResponse {
    #[serde(default)]
    model: String,
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Deserialize, Debug, Clone)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

pub const DEFAULT_ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

#[derive(Debug)]
pub struct AnthropicClient {
    http_client: HttpClient,
    base_url: String,
}

impl AnthropicClient {
    #[instrument(skip(api_key))]
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LLMError> {
        let Some(key) = api_key.filter(|k| !k.trim().is_empty()) else {
            error!("Anthropic API key not provided.");
            return Err(LLMError::NoApiKey(Provider::Anthropic));
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(&key)
                .map_err(|e| LLMError::Other(format!("Invalid Anthropic API key format: {}", e)))?,
        );
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_API_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(LLMError::Network)?;

        let base_url = base_url.unwrap_or_else(|| DEFAULT_ANTHROPIC_API_BASE.to_string());
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LLMError> {
        let request_payload = AnthropicChatRequest {
            model: &request.model,
            messages: [AnthropicMessage {
                role: "user",
                content: &request.user,
            }],
            system: Some(request.system.as_str()).filter(|s| !s.is_empty()),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(payload = ?request_payload, "Sending Anthropic messages request");

        let url = format!("{}/messages", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&request_payload)
            .send()
            .await
            .map_err(LLMError::Network)?;

        let status = response.status();
        debug!(status = ?status, "Received Anthropic response status");

        if !status.is_success() {
            let error_body = response.text().await.map_err(LLMError::Network)?;
            error!(error_body = %error_body, "Anthropic API error");
            return Err(LLMError::ApiError {
                status: status.as_u16(),
                body: error_body,
            });
        }

        let chat_response = response.json::<AnthropicChatResponse>().await.map_err(|e| {
            error!(error = %e, "Failed to parse Anthropic JSON response");
            if e.is_decode() {
                LLMError::ParsingError(e.to_string())
            } else {
                LLMError::Network(e)
            }
        })?;

        // Only text blocks carry the answer; tool_use and thinking blocks are skipped.
        let content = chat_response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        if content.is_empty() {
            return Err(LLMError::EmptyResponse);
        }

        let model = if chat_response.model.is_empty() {
            request.model.clone()
        } else {
            chat_response.model
        };

        Ok(Completion {
            content,
            model,
            usage: TokenUsage::new(
                chat_response.usage.input_tokens,
                chat_response.usage.output_tokens,
            ),
        })
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }
}
