use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{PipelineError, Stage};
use crate::extract::extract_json;
use crate::prompts::{PromptKind, PromptTemplates};
use crate::providers::{Provider, ProviderError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationPair {
    pub english: String,
    pub japanese: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuriganaAnnotation {
    pub furigana: String,
}

pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PipelineError>> + Send + 'a>>;

/// The two remote calls made for every chunk.
///
/// `translate` answers one pair per word, in request order. `annotate_furigana`
/// answers one slot per Japanese word; a slot is `None` when the service left
/// that index out or returned something unusable there.
pub trait Gateway: Send + Sync {
    fn translate<'a>(
        &'a self,
        words: &'a [String],
        credential: &'a str,
    ) -> GatewayFuture<'a, Vec<TranslationPair>>;

    fn annotate_furigana<'a>(
        &'a self,
        japanese_words: &'a [String],
        credential: &'a str,
    ) -> GatewayFuture<'a, Vec<Option<FuriganaAnnotation>>>;
}

/// Gateway backed by a chat-completion provider and a pair of prompt templates.
#[derive(Debug, Clone)]
pub struct ChatGateway<P: Provider> {
    provider: P,
    templates: Arc<PromptTemplates>,
    system_prompt: String,
}

impl<P: Provider> ChatGateway<P> {
    pub fn new(provider: P, templates: Arc<PromptTemplates>, system_prompt: String) -> Self {
        Self {
            provider,
            templates,
            system_prompt,
        }
    }

    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    async fn request(
        &self,
        stage: Stage,
        kind: PromptKind,
        words: &[String],
        credential: &str,
    ) -> Result<Value, PipelineError> {
        let prompt = self.templates.render(kind, words);
        debug!("{} prompt:\n{}", stage, prompt);
        let response = self
            .provider
            .clone()
            .with_credential(credential.to_string())
            .append_system_input(self.system_prompt.clone())
            .append_user_input(prompt)
            .complete()
            .await
            .map_err(|err| provider_error(stage, err))?;
        debug!("{} reply:\n{}", stage, response.content);
        extract_json(&response.content).map_err(|err| err.at(stage))
    }
}

impl<P: Provider + 'static> Gateway for ChatGateway<P> {
    fn translate<'a>(
        &'a self,
        words: &'a [String],
        credential: &'a str,
    ) -> GatewayFuture<'a, Vec<TranslationPair>> {
        Box::pin(async move {
            let value = self
                .request(Stage::Translate, PromptKind::Translate, words, credential)
                .await?;
            decode_pairs(value, words.len())
        })
    }

    fn annotate_furigana<'a>(
        &'a self,
        japanese_words: &'a [String],
        credential: &'a str,
    ) -> GatewayFuture<'a, Vec<Option<FuriganaAnnotation>>> {
        Box::pin(async move {
            let value = self
                .request(Stage::Annotate, PromptKind::Furigana, japanese_words, credential)
                .await?;
            Ok(decode_annotations(value, japanese_words.len()))
        })
    }
}

fn provider_error(stage: Stage, err: ProviderError) -> PipelineError {
    match err {
        ProviderError::Status { status, message } => PipelineError::Gateway {
            stage,
            status,
            message,
        },
        ProviderError::Transport(message) | ProviderError::Malformed(message) => {
            PipelineError::Transport { stage, message }
        }
    }
}

// Models sometimes wrap the list as `{"results": [...]}`; accept a lone array field.
fn into_items(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => {
            let mut arrays = map.into_iter().filter(|(_, v)| v.is_array());
            match (arrays.next(), arrays.next()) {
                (Some((key, Value::Array(items))), None) => {
                    debug!("unwrapped list from '{}' field", key);
                    Some(items)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

pub(crate) fn decode_pairs(
    value: Value,
    expected: usize,
) -> Result<Vec<TranslationPair>, PipelineError> {
    let items = into_items(value).ok_or_else(|| PipelineError::Shape {
        stage: Stage::Translate,
        message: "expected a JSON array of {english, japanese} objects".to_string(),
    })?;
    if items.len() != expected {
        return Err(PipelineError::Shape {
            stage: Stage::Translate,
            message: format!("expected {} translations, got {}", expected, items.len()),
        });
    }
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<TranslationPair>(item).map_err(|err| PipelineError::Shape {
                stage: Stage::Translate,
                message: format!("translation {}: {}", index, err),
            })
        })
        .collect()
}

pub(crate) fn decode_annotations(value: Value, expected: usize) -> Vec<Option<FuriganaAnnotation>> {
    let items = match into_items(value) {
        Some(items) => items,
        None => {
            warn!("furigana reply is not a list; every reading falls back to its Japanese text");
            Vec::new()
        }
    };
    if items.len() != expected {
        debug!("expected {} furigana entries, got {}", expected, items.len());
    }
    let mut annotations = items
        .into_iter()
        .take(expected)
        .map(|item| {
            serde_json::from_value::<FuriganaAnnotation>(item)
                .ok()
                .filter(|annotation| !annotation.furigana.trim().is_empty())
        })
        .collect::<Vec<_>>();
    annotations.resize(expected, None);
    annotations
}
