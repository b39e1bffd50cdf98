use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;

use japanease::{Config, DriveMode, OutputFormat, PipelineState};

#[derive(Parser, Debug)]
#[command(
    name = "japanease",
    version,
    about = "Turn English text into Japanese flip-cards with furigana and romaji"
)]
struct Cli {
    /// Text file to read words from (default: stdin)
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// OpenAI API key (overrides OPENAI_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Chat model name (default from settings: gpt-4o-mini)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Words per chunk sent to the model
    #[arg(short = 'c', long = "chunk-size")]
    chunk_size: Option<usize>,

    /// Output format: text or json
    #[arg(short = 'o', long = "format", default_value = "text")]
    format: OutputFormat,

    /// Process every chunk instead of only the first one
    #[arg(short = 'a', long = "all", conflicts_with = "interactive")]
    all: bool,

    /// Ask before processing each further chunk (requires --data)
    #[arg(short = 'i', long = "interactive")]
    interactive: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Serve the pipeline over HTTP on this address instead of running once
    #[arg(long = "server", num_args = 0..=1, default_missing_value = "")]
    server: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    japanease::logging::init(cli.verbose)?;

    if let Some(addr) = cli.server.as_deref() {
        let settings =
            japanease::settings::load_settings(cli.read_settings.as_deref().map(Path::new))?;
        let addr = if addr.trim().is_empty() {
            settings.server_addr.clone()
        } else {
            addr.trim().to_string()
        };
        eprintln!("listening on http://{}", addr);
        return japanease::server::run_server(settings, addr).await;
    }

    if cli.interactive && cli.data.is_none() {
        return Err(anyhow!(
            "--interactive reads answers from stdin; pass the text with --data"
        ));
    }

    let input = match cli.data.as_deref() {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file: {}", path))?,
        None => {
            if io::stdin().is_terminal() {
                eprintln!("reading text from stdin (Ctrl-D to finish)");
            }
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .with_context(|| "stdin must be UTF-8 text")?;
            buffer
        }
    };

    let drive = if cli.all {
        DriveMode::All
    } else if cli.interactive {
        DriveMode::Interactive
    } else {
        DriveMode::First
    };
    let config = Config {
        key: cli.key,
        model: cli.model,
        chunk_size: cli.chunk_size,
        settings_path: cli.read_settings,
        format: cli.format,
        drive,
    };

    let answers = Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()));
    let ask_next = move |state: &PipelineState| {
        let question = format!(
            "Process next chunk ({} of {})? [Y/n] ",
            state.current_chunk() + 1,
            state.total_chunks()
        );
        let answers = answers.clone();
        async move { ask_next_chunk(&question, &answers).await }
    };

    let output = japanease::run(config, &input, ask_next).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

async fn ask_next_chunk<R>(question: &str, answers: &Mutex<Lines<R>>) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    let mut stderr = tokio::io::stderr();
    stderr.write_all(question.as_bytes()).await?;
    stderr.flush().await?;
    let Some(line) = answers.lock().await.next_line().await? else {
        return Ok(false);
    };
    let answer = line.trim().to_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}
