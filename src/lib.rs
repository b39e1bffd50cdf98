use anyhow::{anyhow, Context, Result};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

pub mod chunk;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod kana;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod server;
pub mod settings;
pub mod tokenize;

pub use chunk::chunk;
pub use error::{ChunkFailure, PipelineError, Stage};
pub use extract::extract_json;
pub use gateway::{ChatGateway, FuriganaAnnotation, Gateway, TranslationPair};
pub use kana::transliterate;
pub use output::OutputFormat;
pub use pipeline::{ChunkOutcome, Phase, Pipeline, PipelineState, WordRecord};
pub use prompts::PromptTemplates;
pub use providers::{OpenAI, Provider};
pub use tokenize::tokenize;

/// How many chunks a CLI run processes before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveMode {
    /// Only the first chunk, like pressing "Translate" once.
    #[default]
    First,
    All,
    /// Ask before every further chunk.
    Interactive,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub key: Option<String>,
    pub model: Option<String>,
    pub chunk_size: Option<usize>,
    pub settings_path: Option<String>,
    pub format: OutputFormat,
    pub drive: DriveMode,
}

/// Runs the pipeline over `input` and renders the cards. In interactive mode
/// `ask_next` is awaited before every further chunk; `false` stops the run.
pub async fn run<F, Fut>(config: Config, input: &str, mut ask_next: F) -> Result<String>
where
    F: FnMut(&PipelineState) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(size) = config.chunk_size {
        if size == 0 {
            return Err(anyhow!("--chunk-size must be greater than zero"));
        }
        settings.chunk_size = size;
    }
    if let Some(model) = config.model.as_deref() {
        if !model.trim().is_empty() {
            settings.model = model.trim().to_string();
        }
    }

    let key = resolve_key(config.key.as_deref()).unwrap_or_default();
    let pipeline = build_pipeline(&settings)?;
    let mut state = pipeline.start(input, &key)?;
    eprintln!(
        "{} words in {} chunks",
        state.tokens().len(),
        state.total_chunks()
    );

    let mut failures = Vec::new();
    loop {
        match pipeline.advance_chunk(&mut state).await {
            ChunkOutcome::AllComplete => break,
            ChunkOutcome::Completed { .. } => {}
            ChunkOutcome::Failed(failure) => {
                eprintln!("error: {}", failure);
                failures.push(pipeline::FailureSummary::from(&failure));
            }
        }
        eprintln!("{}", output::format_progress(&state));
        if !state.has_pending_chunks() {
            break;
        }
        let proceed = match config.drive {
            DriveMode::First => false,
            DriveMode::All => true,
            DriveMode::Interactive => ask_next(&state).await?,
        };
        if !proceed {
            break;
        }
    }

    output::format_output(&state, &failures, config.format)
}

/// Builds the OpenAI-backed pipeline described by `settings`.
pub fn build_pipeline(settings: &settings::Settings) -> Result<Pipeline<ChatGateway<OpenAI>>> {
    let templates = PromptTemplates::load(settings).with_context(|| "failed to load prompts")?;
    let gateway = ChatGateway::new(
        build_provider(settings),
        Arc::new(templates),
        settings.system_prompt.clone(),
    );
    Ok(Pipeline::new(gateway).with_chunk_size(settings.chunk_size))
}

pub fn build_provider(settings: &settings::Settings) -> OpenAI {
    let mut provider = OpenAI::new().with_model(settings.model.clone());
    let base_url = get_env("OPENAI_BASE_URL").or_else(|| settings.base_url.clone());
    if let Some(base_url) = base_url {
        provider = provider.with_base_url(base_url);
    }
    provider
}

/// `--key` wins over `OPENAI_API_KEY`; blank values count as absent.
pub fn resolve_key(override_key: Option<&str>) -> Option<String> {
    override_key
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .or_else(|| get_env("OPENAI_API_KEY"))
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
