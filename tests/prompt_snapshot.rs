use japanease::prompts::{PromptKind, PromptTemplates};
use japanease::settings;

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|word| word.to_string()).collect()
}

#[test]
fn translate_prompt_snapshot() {
    let settings = settings::load_settings(None).unwrap();
    let templates = PromptTemplates::load(&settings).unwrap();
    let prompt = templates.render(PromptKind::Translate, &words(&["The", "cat", "the"]));
    insta::assert_snapshot!(prompt.trim_end(), @r###"
    Translate each of the following English words into Japanese.

    Rules:
    - Keep the words in the order given, one entry per word, including repeats.
    - Use the most common everyday Japanese equivalent for each word.
    - Copy the English word exactly as given into the "english" field.
    - Reply with a JSON array only, in this form:
    [{"english": "cat", "japanese": "猫"}, {"english": "run", "japanese": "走る"}]

    Words: The, cat, the
    "###);
}

#[test]
fn furigana_prompt_snapshot() {
    let settings = settings::load_settings(None).unwrap();
    let templates = PromptTemplates::load(&settings).unwrap();
    let prompt = templates.render(PromptKind::Furigana, &words(&["猫", "走る"]));
    insta::assert_snapshot!(prompt.trim_end(), @r###"
    Give the hiragana reading (furigana) of each of the following Japanese words.

    Rules:
    - Keep the words in the order given, one entry per word, including repeats.
    - The "furigana" field must be written in hiragana only, with no kanji, katakana, or romaji.
    - Copy the Japanese word exactly as given into the "japanese" field.
    - Reply with a JSON array only, in this form:
    [{"japanese": "猫", "furigana": "ねこ"}, {"japanese": "走る", "furigana": "はしる"}]

    Words: 猫, 走る
    "###);
}
