use std::fmt;

use thiserror::Error;

/// Which of the two remote calls of a chunk produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Translate,
    Annotate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Translate => "translate",
            Stage::Annotate => "annotate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("prompt template '{name}' unavailable: {reason}")]
    Template { name: String, reason: String },

    #[error("{stage} request failed with status {status}: {message}")]
    Gateway {
        stage: Stage,
        status: u16,
        message: String,
    },

    #[error("{stage} request could not be completed: {message}")]
    Transport { stage: Stage, message: String },

    #[error("no JSON found in {stage} response")]
    Extraction { stage: Stage },

    #[error("JSON in {stage} response could not be parsed: {message}")]
    Parse { stage: Stage, message: String },

    #[error("unexpected {stage} response shape: {message}")]
    Shape { stage: Stage, message: String },
}

impl PipelineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Gateway { stage, .. }
            | PipelineError::Transport { stage, .. }
            | PipelineError::Extraction { stage }
            | PipelineError::Parse { stage, .. }
            | PipelineError::Shape { stage, .. } => Some(*stage),
            PipelineError::InvalidInput(_)
            | PipelineError::InvalidArgument(_)
            | PipelineError::Template { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::InvalidArgument(_) => "invalid_argument",
            PipelineError::Template { .. } => "template",
            PipelineError::Gateway { .. } => "gateway",
            PipelineError::Transport { .. } => "transport",
            PipelineError::Extraction { .. } => "extraction",
            PipelineError::Parse { .. } => "parse",
            PipelineError::Shape { .. } => "shape",
        }
    }
}

/// A chunk attempt that contributed no records.
#[derive(Debug, Error)]
#[error("chunk {} failed: {error}", .chunk_index + 1)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    #[source]
    pub error: PipelineError,
}
