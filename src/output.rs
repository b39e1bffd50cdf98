use anyhow::{anyhow, Result};
use serde::Serialize;
use std::str::FromStr;

use crate::pipeline::{FailureSummary, PipelineState, WordRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(anyhow!("unknown output format '{}' (expected text or json)", other)),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    current_chunk: usize,
    total_chunks: usize,
    progress_percent: f64,
    records: &'a [WordRecord],
    failures: &'a [FailureSummary],
}

/// Renders the accumulated cards. Text mode prints one card per line:
/// `furigana<TAB>english<TAB>romaji`.
pub fn format_output(
    state: &PipelineState,
    failures: &[FailureSummary],
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(state
            .records()
            .iter()
            .map(|record| format!("{}\t{}\t{}", record.furigana, record.english, record.romaji))
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Json => {
            let output = JsonOutput {
                current_chunk: state.current_chunk(),
                total_chunks: state.total_chunks(),
                progress_percent: state.progress_percent(),
                records: state.records(),
                failures,
            };
            Ok(serde_json::to_string_pretty(&output)?)
        }
    }
}

pub fn format_progress(state: &PipelineState) -> String {
    format!(
        "Processed {} of {} chunks ({:.0}%)",
        state.current_chunk(),
        state.total_chunks(),
        state.progress_percent()
    )
}
