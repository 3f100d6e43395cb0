//! A provider that replays canned answers in order.
//!
//! Records every prompt it receives so callers can check what the model
//! would have seen.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::types::{ChatMessage, LlmResponse};
use super::LlmProvider;

#[derive(Debug, Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every message list received so far.
    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _model: Option<&str>,
        _max_tokens: u32,
        _temperature: f32,
    ) -> anyhow::Result<LlmResponse> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        let next = self
            .replies
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted provider poisoned"))?
            .pop_front();
        match next {
            Some(reply) => Ok(LlmResponse::text(reply)),
            None => anyhow::bail!("scripted provider has no replies left"),
        }
    }

    fn default_model(&self) -> &str {
        "scripted"
    }
}
