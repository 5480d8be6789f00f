//! Lesson content model and loading.

pub mod model;

pub use model::{clean_word, speech_word, Lesson, LessonError, Sentence, SentenceId, WordDefinition, WordLookup};
