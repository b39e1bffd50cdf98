use std::fs;
use std::path::Path;

use crate::error::PipelineError;
use crate::settings::Settings;

pub const WORDS_PLACEHOLDER: &str = "{words}";

const DEFAULT_TRANSLATE_PROMPT: &str = include_str!("translate.txt");
const DEFAULT_FURIGANA_PROMPT: &str = include_str!("furigana.txt");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Translate,
    Furigana,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Translate => "translate",
            PromptKind::Furigana => "furigana",
        }
    }
}

/// Both prompt templates, loaded once and shared by every gateway call of a session.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    translate: String,
    furigana: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            translate: DEFAULT_TRANSLATE_PROMPT.to_string(),
            furigana: DEFAULT_FURIGANA_PROMPT.to_string(),
        }
    }
}

impl PromptTemplates {
    pub fn new(translate: String, furigana: String) -> Result<Self, PipelineError> {
        validate(PromptKind::Translate, &translate)?;
        validate(PromptKind::Furigana, &furigana)?;
        Ok(Self {
            translate,
            furigana,
        })
    }

    /// Uses the files named in settings, falling back to the embedded templates.
    pub fn load(settings: &Settings) -> Result<Self, PipelineError> {
        let translate = match settings.translate_prompt_path.as_deref() {
            Some(path) => read_template(PromptKind::Translate, path)?,
            None => DEFAULT_TRANSLATE_PROMPT.to_string(),
        };
        let furigana = match settings.furigana_prompt_path.as_deref() {
            Some(path) => read_template(PromptKind::Furigana, path)?,
            None => DEFAULT_FURIGANA_PROMPT.to_string(),
        };
        Self::new(translate, furigana)
    }

    pub fn template(&self, kind: PromptKind) -> &str {
        match kind {
            PromptKind::Translate => &self.translate,
            PromptKind::Furigana => &self.furigana,
        }
    }

    pub fn render(&self, kind: PromptKind, words: &[String]) -> String {
        self.template(kind)
            .replacen(WORDS_PLACEHOLDER, &words.join(", "), 1)
    }
}

fn read_template(kind: PromptKind, path: &Path) -> Result<String, PipelineError> {
    fs::read_to_string(path).map_err(|err| PipelineError::Template {
        name: kind.as_str().to_string(),
        reason: format!("failed to read {}: {}", path.display(), err),
    })
}

fn validate(kind: PromptKind, template: &str) -> Result<(), PipelineError> {
    let count = template.matches(WORDS_PLACEHOLDER).count();
    if count != 1 {
        return Err(PipelineError::Template {
            name: kind.as_str().to_string(),
            reason: format!(
                "expected exactly one {} placeholder, found {}",
                WORDS_PLACEHOLDER, count
            ),
        });
    }
    Ok(())
}
