use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

mod openai;

pub use openai::OpenAI;

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Free-form text of the first choice, as the service returned it.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub content: String,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: String) -> Self {
        Self {
            role: MessageRole::System,
            content,
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }
}

pub type ProviderFuture =
    Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send>>;

/// A chat-completion backend. Builders consume `self` so every request starts
/// from a clean clone of the configured provider.
pub trait Provider: Clone + Send + Sync {
    fn with_credential(self, credential: String) -> Self;
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    fn complete(self) -> ProviderFuture;
}
