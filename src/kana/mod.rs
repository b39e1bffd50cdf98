use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

pub const SYLLABLE_SEPARATOR: &str = "-";

static ROMAJI_TABLE: OnceLock<RomajiTable> = OnceLock::new();

/// Hiragana to romaji lookup, one entry per kana character.
#[derive(Debug, Clone, Default)]
pub struct RomajiTable {
    syllables: HashMap<char, String>,
}

impl RomajiTable {
    pub fn load() -> Result<Self> {
        let raw = include_str!("hiragana.json");
        let parsed: KanaData =
            serde_json::from_str(raw).with_context(|| "failed to parse hiragana table")?;
        let mut syllables = HashMap::with_capacity(parsed.hiragana.len());
        for (key, value) in parsed.hiragana {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => {
                    syllables.insert(ch, value);
                }
                _ => warn!("skipping multi-character kana key '{}'", key),
            }
        }
        Ok(Self { syllables })
    }

    pub fn get(&self, ch: char) -> Option<&str> {
        self.syllables.get(&ch).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.syllables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syllables.is_empty()
    }

    /// Maps every character on its own and joins the pieces with `-`.
    /// Characters missing from the table are kept as they are.
    pub fn transliterate(&self, reading: &str) -> String {
        let mut out = String::with_capacity(reading.len() * 2);
        for (i, ch) in reading.chars().enumerate() {
            if i > 0 {
                out.push_str(SYLLABLE_SEPARATOR);
            }
            match self.get(ch) {
                Some(syllable) => out.push_str(syllable),
                None => out.push(ch),
            }
        }
        out
    }
}

/// Process-wide table, parsed from the embedded resource on first use.
pub fn romaji_table() -> &'static RomajiTable {
    ROMAJI_TABLE.get_or_init(|| {
        RomajiTable::load().unwrap_or_else(|err| {
            warn!("{:#}; readings will pass through untransliterated", err);
            RomajiTable::default()
        })
    })
}

pub fn transliterate(reading: &str) -> String {
    romaji_table().transliterate(reading)
}

#[derive(Debug, Deserialize)]
struct KanaData {
    hiragana: HashMap<String, String>,
}
