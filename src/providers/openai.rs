use serde::Deserialize;
use std::fmt;
use serde_json::json;
use tracing::debug;

use super::{Message, Provider, ProviderError, ProviderFuture, ProviderResponse, ProviderUsage};
use crate::settings::DEFAULT_MODEL;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone)]
pub struct OpenAI {
    key: String,
    model: String,
    base_url: Option<String>,
    messages: Vec<Message>,
    client: reqwest::Client,
}

impl OpenAI {
    pub fn new() -> Self {
        Self {
            key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            messages: Vec::new(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        if !base_url.trim().is_empty() {
            self.base_url = Some(base_url.trim().trim_end_matches('/').to_string());
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| {
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
        })
    }
}

impl fmt::Debug for OpenAI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.key.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("OpenAI")
            .field("key", &key)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("messages", &self.messages.len())
            .finish()
    }
}

impl Default for OpenAI {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for OpenAI {
    fn with_credential(mut self, credential: String) -> Self {
        self.key = credential;
        self
    }

    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    fn complete(self) -> ProviderFuture {
        Box::pin(async move { call_chat_completions(self).await })
    }
}

async fn call_chat_completions(provider: OpenAI) -> Result<ProviderResponse, ProviderError> {
    let url = format!("{}/chat/completions", provider.base_url());

    let messages = provider
        .messages
        .iter()
        .map(|message| json!({"role": message.role.as_str(), "content": message.content}))
        .collect::<Vec<_>>();

    let body = json!({
        "model": provider.model,
        "messages": messages,
        "temperature": 0
    });

    debug!("POST {} (model {})", url, provider.model);
    let response = provider
        .client
        .post(&url)
        .bearer_auth(&provider.key)
        .json(&body)
        .send()
        .await
        .map_err(|err| ProviderError::Transport(err.to_string()))?;

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        let message = extract_openai_error(&text).unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| text.clone())
        });
        return Err(ProviderError::Status {
            status: status.as_u16(),
            message,
        });
    }
    extract_chat_response(&text, &provider.model)
}

fn extract_chat_response(
    text: &str,
    fallback_model: &str,
) -> Result<ProviderResponse, ProviderError> {
    let payload: OpenAIResponse = serde_json::from_str(text).map_err(|err| {
        ProviderError::Malformed(format!("failed to parse OpenAI response JSON: {}", err))
    })?;
    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::Malformed("no message content returned".to_string()))?;

    let model = payload
        .model
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage.map(|usage| ProviderUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    });
    Ok(ProviderResponse {
        content,
        model,
        usage,
    })
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(error.message, error.kind, error.code))
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message {
        if !message.trim().is_empty() {
            parts.push(message);
        }
    }
    if let Some(kind) = kind {
        if !kind.trim().is_empty() {
            parts.push(format!("type: {}", kind));
        }
    }
    if let Some(code) = code {
        if !code.trim().is_empty() {
            parts.push(format!("code: {}", code));
        }
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}
