//! Lesson content: sentences, reference audio and the word glossary.
//!
//! Lessons are immutable once loaded.  The JSON shape matches the content
//! files shipped with the reader:
//!
//! ```json
//! {
//!   "title": "At the market",
//!   "sentences": [
//!     { "id": 1, "text": "I like apples.", "audioUrl": "https://…/1.mp3" },
//!     { "id": 2, "text": "How much is it?" }
//!   ],
//!   "wordDefinitions": {
//!     "apples": { "translation": "تفاح", "definition": "A round fruit.", "partOfSpeech": "noun" }
//!   }
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// LessonError
// ---------------------------------------------------------------------------

/// Errors raised while loading lesson content.
#[derive(Debug, Error)]
pub enum LessonError {
    #[error("failed to read lesson file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid lesson JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two sentences share an id, so their scores would collide.
    #[error("duplicate sentence id: {0}")]
    DuplicateSentenceId(SentenceId),
}

// ---------------------------------------------------------------------------
// SentenceId
// ---------------------------------------------------------------------------

/// Sentence identifier.  Content files use both numbers and strings; both
/// are kept as their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SentenceId(String);

impl SentenceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SentenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SentenceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl<'de> Deserialize<'de> for SentenceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => SentenceId(s),
            RawId::Number(n) => SentenceId(n.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Sentence / WordDefinition
// ---------------------------------------------------------------------------

/// One reference utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentence {
    pub id: SentenceId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl Sentence {
    pub fn new(id: impl Into<String>, text: impl Into<String>, audio_url: Option<&str>) -> Self {
        Self {
            id: SentenceId::new(id),
            text: text.into(),
            audio_url: audio_url.map(str::to_string),
        }
    }
}

/// Glossary entry for a single word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordDefinition {
    pub translation: String,
    pub definition: String,
    pub part_of_speech: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
}

/// What the word sidebar shows for a clicked word.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordLookup {
    pub word: String,
    pub translation: String,
    pub definition: String,
    pub part_of_speech: String,
    pub rank: Option<u32>,
    /// `false` when the glossary had no entry and placeholders were used.
    pub known: bool,
}

const UNKNOWN_TRANSLATION: &str = "ترجمة غير متوفرة";
const UNKNOWN_DEFINITION: &str = "Definition not available";
const UNKNOWN_PART_OF_SPEECH: &str = "word";

/// Strip the punctuation a clicked word may carry (`"apples."` → `"apples"`).
pub fn clean_word(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | '\'' | '"'))
        .collect()
}

/// Reduce a clicked word to what should be pronounced: word characters,
/// apostrophes and hyphens (`"(well-known)"` → `"well-known"`).
pub fn speech_word(raw: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w'-]").expect("static regex"))
        .replace_all(raw, "")
        .into_owned()
}

// ---------------------------------------------------------------------------
// Lesson
// ---------------------------------------------------------------------------

/// An ordered list of sentences plus the word glossary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub sentences: Vec<Sentence>,
    #[serde(default)]
    pub word_definitions: HashMap<String, WordDefinition>,
}

impl Lesson {
    /// Build a lesson from sentences alone (no glossary).
    pub fn from_sentences(sentences: Vec<Sentence>) -> Result<Self, LessonError> {
        let lesson = Self {
            sentences,
            ..Self::default()
        };
        lesson.validate()?;
        Ok(lesson)
    }

    /// Parse and validate lesson JSON.
    pub fn from_json(json: &str) -> Result<Self, LessonError> {
        let lesson: Self = serde_json::from_str(json)?;
        lesson.validate()?;
        Ok(lesson)
    }

    /// Read and parse a lesson file.
    pub fn load_from(path: &Path) -> Result<Self, LessonError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn validate(&self) -> Result<(), LessonError> {
        let mut seen = HashSet::new();
        for sentence in &self.sentences {
            if !seen.insert(&sentence.id) {
                return Err(LessonError::DuplicateSentenceId(sentence.id.clone()));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn sentence(&self, index: usize) -> Option<&Sentence> {
        self.sentences.get(index)
    }

    pub fn find(&self, id: &SentenceId) -> Option<&Sentence> {
        self.sentences.iter().find(|s| &s.id == id)
    }

    /// Look up a clicked word in the glossary.
    ///
    /// Punctuation is stripped first; an exact key is preferred over a
    /// lower-cased one.  Unknown words get placeholder text so the sidebar
    /// always has something to show.
    pub fn lookup_word(&self, raw: &str) -> WordLookup {
        let word = clean_word(raw);
        let entry = self
            .word_definitions
            .get(&word)
            .or_else(|| self.word_definitions.get(&word.to_lowercase()));

        match entry {
            Some(def) => WordLookup {
                word,
                translation: def.translation.clone(),
                definition: def.definition.clone(),
                part_of_speech: def.part_of_speech.clone(),
                rank: def.rank,
                known: true,
            },
            None => WordLookup {
                word,
                translation: UNKNOWN_TRANSLATION.into(),
                definition: UNKNOWN_DEFINITION.into(),
                part_of_speech: UNKNOWN_PART_OF_SPEECH.into(),
                rank: None,
                known: false,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
