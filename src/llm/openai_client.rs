use super::base_client::{
    Completion, CompletionRequest, LLMClient, LLMError, Provider, TokenUsage,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Serialize, Debug)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: [OpenAIMessage<'a>; 2],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize, Debug)]
struct OpenAIChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize, Debug)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize, Debug)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OpenAIUsage {
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: Option<u32>,
    total_tokens: u32,
}

#[derive(Debug)]
pub struct OpenAIClient {
    http_client: HttpClient,
    base_url: String,
}

impl OpenAIClient {
    #[instrument(skip(api_key))]
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LLMError> {
        let Some(key) = api_key.filter(|k| !k.trim().is_empty()) else {
            error!("OpenAI API key not provided.");
            return Err(LLMError::NoApiKey(Provider::OpenAI));
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| LLMError::Other(format!("Invalid API key format: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(LLMError::Network)?;

        let base_url = base_url.unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string());
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LLMError> {
        let request_payload = OpenAIChatRequest {
            model: &request.model,
            messages: [
                OpenAIMessage {
                    role: "system",
                    content: &request.system,
                },
                OpenAIMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(payload = ?request_payload, "Sending OpenAI chat request");

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&request_payload)
            .send()
            .await
            .map_err(LLMError::Network)?;

        let status = response.status();
        debug!(status = ?status, "Received OpenAI response status");

        if !status.is_success() {
            let error_body = response.text().await.map_err(LLMError::Network)?;
            error!(error_body = %error_body, "OpenAI API error");
            return Err(LLMError::ApiError {
                status: status.as_u16(),
                body: error_body,
            });
        }

        let chat_response = response.json::<OpenAIChatResponse>().await.map_err(|e| {
            error!(error = %e, "Failed to parse OpenAI JSON response");
            if e.is_decode() {
                LLMError::ParsingError(e.to_string())
            } else {
                LLMError::Network(e)
            }
        })?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LLMError::EmptyResponse)?;

        let usage = chat_response
            .usage
            .map(|u| {
                let completion_tokens = u
                    .completion_tokens
                    .unwrap_or_else(|| u.total_tokens.saturating_sub(u.prompt_tokens));
                TokenUsage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: completion_tokens,
                    total_tokens: u.total_tokens,
                }
            })
            .unwrap_or_default();

        let model = if chat_response.model.is_empty() {
            request.model.clone()
        } else {
            chat_response.model
        };

        Ok(Completion {
            content,
            model,
            usage,
        })
    }

    fn provider(&self) -> Provider {
        Provider::OpenAI
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".to_string(),
            system: "Translate into French.".to_string(),
            user: "Good morning".to_string(),
            max_tokens: 1000,
            temperature: None,
        }
    }

    fn client_for(server: &MockServer, api_key: &str) -> OpenAIClient {
        OpenAIClient::new(
            Some(api_key.to_string()),
            Some(server.uri()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_openai_client_new_no_api_key() {
        match OpenAIClient::new(None, None, Duration::from_secs(5)) {
            Err(LLMError::NoApiKey(Provider::OpenAI)) => {}
            other => panic!("Expected NoApiKey error, got {:?}", other),
        }
        assert!(OpenAIClient::new(Some("  ".to_string()), None, Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn test_openai_complete_sends_system_and_user_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(header("Content-Type", "application/json"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "max_tokens": 1000,
                "messages": [
                    { "role": "system", "content": "Translate into French." },
                    { "role": "user", "content": "Good morning" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-test123",
                "object": "chat.completion",
                "created": 1677652288,
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": "Bonjour" },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = client_for(&server, "sk-test")
            .complete(&request())
            .await
            .unwrap();
        assert_eq!(completion.content, "Bonjour");
        assert_eq!(completion.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(completion.usage, TokenUsage::new(9, 2));
    }

    #[tokio::test]
    async fn test_openai_api_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = client_for(&server, "sk-bad")
            .complete(&request())
            .await
            .unwrap_err();
        match err {
            LLMError::ApiError { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("Expected ApiError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_openai_missing_content_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o-mini",
                "choices": []
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, "sk-test")
            .complete(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_openai_malformed_body_is_parsing_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server, "sk-test")
            .complete(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::ParsingError(_)));
    }
}
