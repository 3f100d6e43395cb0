//! OpenAI-compatible LLM provider.
//!
//! One implementation covers every backend that exposes an OpenAI-compatible
//! `/chat/completions` endpoint:
//!
//! - LM Studio (`http://localhost:1234/v1`)
//! - OpenAI (`https://api.openai.com/v1`)
//! - OpenRouter (`https://openrouter.ai/api/v1`)
//! - DeepSeek, Groq, Gemini's OpenAI shim
//! - vLLM / any local server

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{ChatMessage, LlmResponse, Usage};
use super::LlmProvider;

/// Known provider base URLs.
const PROVIDER_URLS: &[(&str, &str)] = &[
    ("lmstudio", "http://localhost:1234/v1"),
    ("openrouter", "https://openrouter.ai/api/v1"),
    ("openai", "https://api.openai.com/v1"),
    ("anthropic", "https://api.anthropic.com/v1"),
    ("deepseek", "https://api.deepseek.com/v1"),
    ("groq", "https://api.groq.com/openai/v1"),
    (
        "gemini",
        "https://generativelanguage.googleapis.com/v1beta/openai",
    ),
];

/// Maximum number of retry attempts for transient errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 500;

/// OpenAI-compatible provider.
///
/// Retries transient HTTP errors (429, 500, 502, 503, 504) and network
/// failures with exponential backoff.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiProvider {
    /// Create a new provider.
    ///
    /// # Arguments
    /// * `provider_name` - Provider identifier (e.g., "lmstudio", "openai", "vllm")
    /// * `api_key` - API key for authentication (may be empty for local servers)
    /// * `api_base` - Custom base URL (overrides the default for the provider)
    /// * `default_model` - Default model to use
    pub fn new(
        provider_name: &str,
        api_key: &str,
        api_base: Option<&str>,
        default_model: &str,
        client: Client,
    ) -> Self {
        let base_url = api_base
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                PROVIDER_URLS
                    .iter()
                    .find(|(name, _)| *name == provider_name)
                    .map(|(_, url)| url.to_string())
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            })
            .trim_end_matches('/')
            .to_string();

        debug!(provider = provider_name, base_url = %base_url, "Initialized LLM provider");

        Self {
            client,
            api_key: api_key.to_string(),
            base_url,
            default_model: default_model.to_string(),
        }
    }

    /// Returns `true` if the HTTP status code is transient and should be retried.
    fn is_retryable_status(status: reqwest::StatusCode) -> bool {
        matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
    }
}

// ── OpenAI API request/response types ───────────────────────────────

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageResponse>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageResponse,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageResponse {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorResponse {
    Single(ErrorBody),
    Multiple(Vec<ErrorBody>),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ErrorResponse {
    fn message(&self) -> String {
        match self {
            Self::Single(b) => b.error.message.clone(),
            Self::Multiple(v) => v
                .first()
                .map(|b| b.error.message.clone())
                .unwrap_or_else(|| "Unknown error".into()),
        }
    }
}

// ── LlmProvider implementation ──────────────────────────────────────

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<LlmResponse> {
        let model = model.unwrap_or(&self.default_model);
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = CompletionRequest {
            model,
            messages,
            max_tokens,
            temperature,
        };

        debug!(model, url = %url, msg_count = messages.len(), "Sending chat completion request");

        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                warn!(attempt, delay_ms = delay, "Retrying LLM API request");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let mut request = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&request_body);
            if !self.api_key.is_empty() {
                request = request.bearer_auth(&self.api_key);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt, error = %e, "Network error calling LLM API");
                    last_error = Some(e.into());
                    continue;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read LLM API response body")?;

            if !status.is_success() {
                let err_msg = serde_json::from_str::<ErrorResponse>(&body)
                    .map(|e| e.message())
                    .unwrap_or_else(|_| body.clone());

                if Self::is_retryable_status(status) {
                    warn!(attempt, status = %status, "Transient LLM API error, will retry");
                    last_error = Some(anyhow::anyhow!("LLM API error ({}): {}", status, err_msg));
                    continue;
                }

                anyhow::bail!("LLM API error ({}): {}", status, err_msg);
            }

            let completion: CompletionResponse =
                serde_json::from_str(&body).context("Failed to parse LLM API response")?;

            let choice = completion
                .choices
                .into_iter()
                .next()
                .context("LLM API returned no choices")?;

            let usage = completion.usage.map_or(Usage::default(), |u| Usage {
                prompt_tokens: u.prompt_tokens.unwrap_or(0),
                completion_tokens: u.completion_tokens.unwrap_or(0),
                total_tokens: u.total_tokens.unwrap_or(0),
            });

            debug!(
                finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
                tokens = usage.total_tokens,
                "Received LLM response"
            );

            return Ok(LlmResponse {
                content: choice.message.content,
                finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".into()),
                usage,
            });
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("LLM API request failed after {} retries", MAX_RETRIES)
        }))
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_provider_url_lookup() {
        let client = Client::new();
        let p = OpenAiProvider::new("lmstudio", "", None, "local-model", client.clone());
        assert_eq!(p.base_url, "http://localhost:1234/v1");

        let p = OpenAiProvider::new("deepseek", "test-key", None, "test-model", client);
        assert_eq!(p.base_url, "https://api.deepseek.com/v1");
    }

    #[test]
    fn test_custom_base_url() {
        let p = OpenAiProvider::new(
            "vllm",
            "dummy",
            Some("http://localhost:8000/v1/"),
            "llama-3",
            Client::new(),
        );
        assert_eq!(p.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn test_retryable_status() {
        assert!(OpenAiProvider::is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(OpenAiProvider::is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!OpenAiProvider::is_retryable_status(reqwest::StatusCode::BAD_REQUEST));
        assert!(!OpenAiProvider::is_retryable_status(reqwest::StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_chat_parses_completion() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer k");
                then.status(200).json_body(serde_json::json!({
                    "choices": [{
                        "message": {"content": "{\"method\":\"GET\"}"},
                        "finish_reason": "stop"
                    }],
                    "usage": {"total_tokens": 42}
                }));
            })
            .await;

        let p = OpenAiProvider::new("openai", "k", Some(&server.url("/v1")), "m", Client::new());
        let res = p.chat(&[ChatMessage::user("hi")], None, 100, 0.3).await.unwrap();

        mock.assert_async().await;
        assert_eq!(res.content.as_deref(), Some("{\"method\":\"GET\"}"));
        assert_eq!(res.usage.total_tokens, 42);
    }

    #[tokio::test]
    async fn test_chat_fails_fast_on_client_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(400)
                    .json_body(serde_json::json!({"error": {"message": "bad model"}}));
            })
            .await;

        let p = OpenAiProvider::new("openai", "k", Some(&server.url("/v1")), "m", Client::new());
        let err = p
            .chat(&[ChatMessage::user("hi")], None, 100, 0.3)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad model"));
    }
}
