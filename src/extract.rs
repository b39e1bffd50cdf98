use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

use crate::error::{PipelineError, Stage};

static JSON_SPAN: OnceLock<Regex> = OnceLock::new();

fn json_span() -> &'static Regex {
    // Leftmost start wins; each alternative is greedy up to the last closer.
    JSON_SPAN.get_or_init(|| Regex::new(r"(?s)(\[.*\]|\{.*\})").expect("json span pattern is valid"))
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON array or object found")]
    NotFound,
    #[error("{0}")]
    Parse(#[from] serde_json::Error),
}

impl ExtractError {
    pub(crate) fn at(self, stage: Stage) -> PipelineError {
        match self {
            ExtractError::NotFound => PipelineError::Extraction { stage },
            ExtractError::Parse(err) => PipelineError::Parse {
                stage,
                message: err.to_string(),
            },
        }
    }
}

/// Finds the bracketed span that looks like JSON inside free-form text.
///
/// The span starts at the first `[` or `{` that has a matching closer somewhere
/// after it and ends at the last such closer in the string.
pub fn locate_json(raw: &str) -> Option<&str> {
    json_span().find(raw).map(|m| m.as_str())
}

pub fn parse_json(span: &str) -> Result<Value, ExtractError> {
    Ok(serde_json::from_str(span)?)
}

pub fn extract_json(raw: &str) -> Result<Value, ExtractError> {
    let span = locate_json(raw).ok_or(ExtractError::NotFound)?;
    parse_json(span)
}
