use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chunk::DEFAULT_CHUNK_SIZE;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI Assistant specialized in Japanese language processing and translation.";

#[derive(Debug, Clone)]
pub struct Settings {
    pub chunk_size: usize,
    pub model: String,
    pub base_url: Option<String>,
    pub system_prompt: String,
    pub translate_prompt_path: Option<PathBuf>,
    pub furigana_prompt_path: Option<PathBuf>,
    pub server_addr: String,
    pub session_ttl: Duration,
    pub max_sessions: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            translate_prompt_path: None,
            furigana_prompt_path: None,
            server_addr: "127.0.0.1:11400".to_string(),
            session_ttl: Duration::from_secs(30 * 60),
            max_sessions: 256,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    pipeline: Option<PipelineSettings>,
    openai: Option<OpenAISettings>,
    prompts: Option<PromptSettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineSettings {
    chunk_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAISettings {
    model: Option<String>,
    base_url: Option<String>,
    system_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PromptSettings {
    translate: Option<String>,
    furigana: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
    session_ttl_secs: Option<u64>,
    max_sessions: Option<usize>,
}

/// Loads the embedded defaults, then layers every settings file that exists.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    load_settings_from(&ordered_paths)
}

pub fn load_settings_from(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults, None)?;

    for path in paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings
                .merge(parsed, path.parent())
                .with_context(|| format!("invalid settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile, base_dir: Option<&Path>) -> Result<()> {
        if let Some(pipeline) = incoming.pipeline {
            if let Some(size) = pipeline.chunk_size {
                if size == 0 {
                    return Err(anyhow!("pipeline.chunk_size must be greater than zero"));
                }
                self.chunk_size = size;
            }
        }
        if let Some(openai) = incoming.openai {
            if let Some(model) = openai.model {
                if !model.trim().is_empty() {
                    self.model = model.trim().to_string();
                }
            }
            if let Some(url) = openai.base_url {
                if !url.trim().is_empty() {
                    self.base_url = Some(url.trim().trim_end_matches('/').to_string());
                }
            }
            if let Some(prompt) = openai.system_prompt {
                if !prompt.trim().is_empty() {
                    self.system_prompt = prompt;
                }
            }
        }
        if let Some(prompts) = incoming.prompts {
            if let Some(path) = prompts.translate {
                self.translate_prompt_path = resolve_path(&path, base_dir);
            }
            if let Some(path) = prompts.furigana {
                self.furigana_prompt_path = resolve_path(&path, base_dir);
            }
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = server.addr {
                if !addr.trim().is_empty() {
                    self.server_addr = addr.trim().to_string();
                }
            }
            if let Some(secs) = server.session_ttl_secs {
                self.session_ttl = Duration::from_secs(secs);
            }
            if let Some(max) = server.max_sessions {
                if max == 0 {
                    return Err(anyhow!("server.max_sessions must be greater than zero"));
                }
                self.max_sessions = max;
            }
        }
        Ok(())
    }
}

// Relative prompt paths are taken relative to the settings file naming them.
fn resolve_path(raw: &str, base_dir: Option<&Path>) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let path = PathBuf::from(raw);
    match base_dir {
        Some(base) if path.is_relative() && !base.as_os_str().is_empty() => Some(base.join(path)),
        _ => Some(path),
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".japanease"))
        }
    })
}
