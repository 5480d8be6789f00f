//! Per-word feedback for the result view.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// How one reference word was reproduced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordFeedback {
    /// Reference word exactly as written in the lesson.
    pub word: String,
    /// Transcript word at the same position, if any.
    pub heard: Option<String>,
    pub correct: bool,
}

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w]").expect("static regex"))
}

fn clean(word: &str) -> String {
    non_word().replace_all(word, "").to_lowercase()
}

/// Compare `user_text` against `original_text` word by word, by position.
///
/// Words are compared after dropping non-word characters and lower-casing,
/// so `"Hello,"` matches `"hello"`.  Contractions are not expanded here: the
/// learner sees their own words against the lesson's words.
pub fn word_feedback(user_text: &str, original_text: &str) -> Vec<WordFeedback> {
    let heard: Vec<&str> = user_text.split_whitespace().collect();

    original_text
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            let user_word = heard.get(i).copied();
            let correct = user_word.is_some_and(|u| clean(u) == clean(word));
            WordFeedback {
                word: word.to_string(),
                heard: user_word.map(str::to_string),
                correct,
            }
        })
        .collect()
}
