use regex::Regex;
use std::sync::OnceLock;

static WORD_PATTERN: OnceLock<Regex> = OnceLock::new();

fn word_pattern() -> &'static Regex {
    WORD_PATTERN.get_or_init(|| Regex::new(r"\w+").expect("word pattern is valid"))
}

/// Splits `text` into its maximal runs of word characters, in order.
///
/// Word characters follow Unicode `\w` (letters and digits of any script,
/// plus connector punctuation). Everything else, including CJK punctuation,
/// is dropped. Duplicates are preserved.
pub fn tokenize(text: &str) -> Vec<String> {
    word_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}
