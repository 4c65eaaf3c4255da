pub(crate) mod ollama;
pub(crate) mod openai;

use std::ops::AddAssign;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) use self::{ollama::OllamaClient, openai::OpenAiClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged chat message as sent to the language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Message {
    pub(crate) role: Role,
    pub(crate) content: String,
}

impl Message {
    pub(crate) fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub(crate) fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token counters reported by the completion service.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Usage {
    #[serde(default)]
    pub(crate) prompt_tokens: u64,
    #[serde(default)]
    pub(crate) completion_tokens: u64,
    #[serde(default)]
    pub(crate) total_tokens: u64,
}

impl Usage {
    pub(crate) fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

/// The full free-text answer of one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Answer {
    pub(crate) text: String,
    pub(crate) usage: Usage,
}

#[derive(Debug, Error)]
pub(crate) enum CompletionError {
    #[error("request to the completion service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion service error: {0}")]
    Service(String),

    #[error("unexpected completion payload: {0}")]
    Parse(String),

    #[error("completion service returned no answer")]
    Empty,

    #[error("completion service did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

/// A language-model service that answers a conversation with free text.
///
/// Implementations block (asynchronously) until the whole answer is known,
/// even when the service streams it.
#[async_trait]
pub(crate) trait Completion: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<Answer, CompletionError>;
}
