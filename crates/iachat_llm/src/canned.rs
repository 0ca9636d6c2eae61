use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::model::{ChatModel, Completion, CompletionRequest, LlmError};

#[derive(Debug, Clone)]
enum Canned {
    Reply(String),
    Unavailable(String),
}

/// Answers every request with the same canned text, or the same failure.
/// Used when no API key is configured and in tests.
#[derive(Debug)]
pub struct StaticChatModel {
    canned: Canned,
    calls: AtomicUsize,
}

impl StaticChatModel {
    pub fn reply(content: impl Into<String>) -> Self {
        Self {
            canned: Canned::Reply(content.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            canned: Canned::Unavailable(reason.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for StaticChatModel {
    fn name(&self) -> &str {
        "static"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        debug!(model = %request.model, messages = request.messages.len(), "static model request");

        match &self.canned {
            Canned::Reply(content) => Ok(Completion {
                content: content.clone(),
                model: request.model.clone(),
                prompt_tokens: 0,
                completion_tokens: 0,
            }),
            Canned::Unavailable(reason) => Err(LlmError::Transport(reason.clone())),
        }
    }
}
