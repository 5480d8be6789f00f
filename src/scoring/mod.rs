//! Text normalization and pronunciation scoring.
//!
//! Everything in this module is a pure, total function: empty or garbage
//! input degrades to a score of 0, never to an error.
//!
//! # Pipeline
//!
//! ```text
//! transcript ─┐
//!             ├─ normalize ─▶ tokens ─▶ positional compare ─▶ score_sentence
//! reference ──┘                              │
//!                                 edit_distance / word_similarity
//!
//! score_sentence × 0.85 + confidence × 15 ─▶ EvaluationLevel band
//! ```
//!
//! # Quick start
//!
//! ```
//! use lesson_coach::scoring::{evaluate, EvaluationLevel};
//!
//! let result = evaluate("The cat sat.", "the cat sat", 0.1);
//! assert_eq!(result.score, 100);
//! assert_eq!(result.level, EvaluationLevel::Excellent);
//! ```

pub mod feedback;
pub mod normalize;
pub mod scorer;
pub mod similarity;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use feedback::{word_feedback, WordFeedback};
pub use normalize::{normalize, tokens};
pub use scorer::{evaluate, score_sentence, ColorTag, EvaluationLevel, EvaluationResult, Scorer};
pub use similarity::{edit_distance, word_similarity};
