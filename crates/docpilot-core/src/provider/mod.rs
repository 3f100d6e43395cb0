//! LLM provider trait and registry.
//!
//! Defines the `LlmProvider` trait that all backends must implement.
//! The `openai` module provides an OpenAI-compatible implementation
//! that covers most providers (OpenRouter, DeepSeek, Groq, LM Studio, vLLM, etc.).

pub mod openai;
pub mod scripted;
pub mod types;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use types::{ChatMessage, LlmResponse};

/// Trait for LLM providers.
///
/// The synthesizer only needs plain chat completions: no tool calling,
/// no streaming.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// # Arguments
    /// * `messages` - Prompt messages (system + user)
    /// * `model` - Model identifier override (None = use default)
    /// * `max_tokens` - Maximum response tokens
    /// * `temperature` - Sampling temperature
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        max_tokens: u32,
        temperature: f32,
    ) -> anyhow::Result<LlmResponse>;

    /// Get the default model identifier.
    fn default_model(&self) -> &str;
}

/// A provider that wraps multiple other providers and implements failover logic.
///
/// If a provider fails with a quota error (like a 429), the `FallbackProvider`
/// quarantines it and tries the next provider in its list.
pub struct FallbackProvider {
    providers: Vec<(String, Box<dyn LlmProvider>)>,
    /// Maps provider name to the time of the last quota error.
    health: Mutex<HashMap<String, Instant>>,
}

/// Duration to quarantine a provider after a quota error.
const QUARANTINE_DURATION: Duration = Duration::from_secs(60);

impl FallbackProvider {
    pub fn new(providers: Vec<(String, Box<dyn LlmProvider>)>) -> Self {
        Self {
            providers,
            health: Mutex::new(HashMap::new()),
        }
    }

    fn is_quarantined(&self, name: &str, now: Instant) -> bool {
        let health = self.health.lock().unwrap_or_else(|p| p.into_inner());
        health
            .get(name)
            .is_some_and(|&last_err| now.duration_since(last_err) < QUARANTINE_DURATION)
    }

    fn quarantine(&self, name: &str) {
        let mut health = self.health.lock().unwrap_or_else(|p| p.into_inner());
        health.insert(name.to_string(), Instant::now());
    }
}

fn is_quota_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429") || lower.contains("quota") || lower.contains("rate limit")
}

#[async_trait]
impl LlmProvider for FallbackProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        max_tokens: u32,
        temperature: f32,
    ) -> anyhow::Result<LlmResponse> {
        let mut last_error = None;
        let now = Instant::now();

        for (i, (name, provider)) in self.providers.iter().enumerate() {
            if self.is_quarantined(name, now) {
                debug!(provider = %name, "Provider is in quarantine, skipping");
                continue;
            }

            // The model override only makes sense for the primary provider.
            let effective_model = if i == 0 { model } else { None };

            match provider
                .chat(messages, effective_model, max_tokens, temperature)
                .await
            {
                Ok(res) => return Ok(res),
                Err(e) => {
                    let err_str = e.to_string();
                    if is_quota_error(&err_str) {
                        warn!(
                            provider = %name,
                            error = %err_str,
                            "Provider failed with quota error, entering quarantine"
                        );
                        self.quarantine(name);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("All providers are exhausted or in quarantine")))
    }

    fn default_model(&self) -> &str {
        self.providers
            .first()
            .map(|(_, p)| p.default_model())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedProvider {
        reply: Result<&'static str, &'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _model: Option<&str>,
            _max_tokens: u32,
            _temperature: f32,
        ) -> anyhow::Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Ok(text) => Ok(LlmResponse::text(text)),
                Err(err) => Err(anyhow::anyhow!(err)),
            }
        }

        fn default_model(&self) -> &str {
            "fixed"
        }
    }

    fn fixed(reply: Result<&'static str, &'static str>) -> (Box<dyn LlmProvider>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(FixedProvider {
                reply,
                calls: Arc::clone(&calls),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn test_fallback_skips_quota_errors() {
        let (primary, primary_calls) = fixed(Err("LLM API error (429): rate limit"));
        let (backup, backup_calls) = fixed(Ok("from backup"));
        let provider = FallbackProvider::new(vec![
            ("primary".into(), primary),
            ("backup".into(), backup),
        ]);

        let res = provider
            .chat(&[ChatMessage::user("hi")], None, 10, 0.0)
            .await
            .unwrap();
        assert_eq!(res.content.as_deref(), Some("from backup"));

        // Primary is now quarantined and should not be called again.
        provider
            .chat(&[ChatMessage::user("hi")], None, 10, 0.0)
            .await
            .unwrap();
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backup_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fallback_returns_hard_errors_immediately() {
        let (primary, _) = fixed(Err("LLM API error (401): invalid key"));
        let (backup, backup_calls) = fixed(Ok("unused"));
        let provider = FallbackProvider::new(vec![
            ("primary".into(), primary),
            ("backup".into(), backup),
        ]);

        let err = provider
            .chat(&[ChatMessage::user("hi")], None, 10, 0.0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
        assert_eq!(backup_calls.load(Ordering::SeqCst), 0);
    }
}
