use serde::{Deserialize, Serialize};

use crate::pipeline::{ChunkOutcome, FailureSummary, Phase, PipelineState, WordRecord};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct StartRequest {
    pub(crate) text: Option<String>,
    pub(crate) key: Option<String>,
    pub(crate) chunk_size: Option<usize>,
    /// Process the first chunk right away (default true).
    pub(crate) auto_start: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionSnapshot {
    pub(crate) id: String,
    pub(crate) phase: Phase,
    pub(crate) current_chunk: usize,
    pub(crate) total_chunks: usize,
    pub(crate) progress_percent: f64,
    pub(crate) total_words: usize,
    pub(crate) records: Vec<WordRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) last_error: Option<FailureSummary>,
}

impl SessionSnapshot {
    pub(crate) fn new(id: &str, state: &PipelineState) -> Self {
        Self {
            id: id.to_string(),
            phase: state.phase(),
            current_chunk: state.current_chunk(),
            total_chunks: state.total_chunks(),
            progress_percent: state.progress_percent(),
            total_words: state.tokens().len(),
            records: state.records().to_vec(),
            last_error: state.last_failure().cloned(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum OutcomePayload {
    Completed { chunk_index: usize, added: usize },
    Failed { error: FailureSummary },
    AllComplete,
}

impl From<&ChunkOutcome> for OutcomePayload {
    fn from(outcome: &ChunkOutcome) -> Self {
        match outcome {
            ChunkOutcome::Completed { chunk_index, added } => OutcomePayload::Completed {
                chunk_index: *chunk_index,
                added: *added,
            },
            ChunkOutcome::Failed(failure) => OutcomePayload::Failed {
                error: FailureSummary::from(failure),
            },
            ChunkOutcome::AllComplete => OutcomePayload::AllComplete,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) outcome: Option<OutcomePayload>,
    pub(crate) session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
    pub(crate) kind: String,
}
