//! Scripted provider for unit tests. Never touches the network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};

type Responder = Box<dyn Fn(&[ChatMessage]) -> Result<String, ProviderError> + Send + Sync>;

/// Replies from a queue first, then from an optional responder function.
pub(crate) struct ScriptedProvider {
    queue: Mutex<VecDeque<Result<String, ProviderError>>>,
    responder: Option<Responder>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: None,
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Same reply for every call.
    pub(crate) fn always(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::routed(move |_| Ok(reply.clone()))
    }

    /// Reply computed from the request.
    pub(crate) fn routed(
        responder: impl Fn(&[ChatMessage]) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    pub(crate) fn reply(self, text: &str) -> Self {
        self.queue.lock().push_back(Ok(text.to_string()));
        self
    }

    pub(crate) fn fail(self, error: ProviderError) -> Self {
        self.queue.lock().push_back(Err(error));
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub(crate) fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().clone()
    }

    /// User prompts of every call, in order.
    pub(crate) fn user_prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|messages| messages.iter().find(|m| m.role == "user"))
            .map(|m| m.content.clone())
            .collect()
    }
}

/// The user prompt of a request.
pub(crate) fn user_prompt(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.lock().push(messages.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.queue.lock().pop_front();
        let content = match (next, &self.responder) {
            (Some(scripted), _) => scripted?,
            (None, Some(responder)) => responder(&messages)?,
            (None, None) => {
                return Err(ProviderError::NotConfigured("script exhausted".to_string()))
            }
        };

        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                ..TokenUsage::default()
            },
            model: config.model.clone(),
            stop_reason: Some("stop".to_string()),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
