//! Sentence scoring and pronunciation evaluation bands.
//!
//! [`Scorer`] combines a positional word comparison of the normalized
//! transcript against the reference sentence with the recognizer's own
//! confidence, and maps the result onto one of five [`EvaluationLevel`]s.
//!
//! # Sentence score
//!
//! ```text
//! ratio   = (exact matches + Σ partial similarity/100) / len(reference)
//! penalty = |len(user) - len(reference)| / len(reference) * length_penalty
//! score   = clamp(round((ratio - penalty) * 100), 0, 100)
//! ```
//!
//! A word at position `i` earns partial credit only when its
//! [`word_similarity`] against reference word `i` reaches
//! [`ScoringConfig::partial_match_threshold`].  Words are aligned strictly
//! by position: an inserted or dropped word shifts every later comparison.

use serde::Serialize;

use crate::config::ScoringConfig;
use crate::scoring::normalize::{normalize, tokens};
use crate::scoring::similarity::word_similarity;

// ---------------------------------------------------------------------------
// EvaluationLevel
// ---------------------------------------------------------------------------

/// Ordered feedback bands, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationLevel {
    Excellent,
    VeryGood,
    Good,
    NeedsImprovement,
    Poor,
}

/// Display colour attached to each band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    Green,
    Blue,
    Teal,
    Yellow,
    Red,
}

impl ColorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorTag::Green => "green",
            ColorTag::Blue => "blue",
            ColorTag::Teal => "teal",
            ColorTag::Yellow => "yellow",
            ColorTag::Red => "red",
        }
    }
}

impl EvaluationLevel {
    /// Band for an overall 0 to 100 score.
    ///
    /// ```
    /// use lesson_coach::scoring::EvaluationLevel;
    ///
    /// assert_eq!(EvaluationLevel::from_score(90), EvaluationLevel::Excellent);
    /// assert_eq!(EvaluationLevel::from_score(89), EvaluationLevel::VeryGood);
    /// assert_eq!(EvaluationLevel::from_score(0), EvaluationLevel::Poor);
    /// ```
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => EvaluationLevel::Excellent,
            75..=89 => EvaluationLevel::VeryGood,
            60..=74 => EvaluationLevel::Good,
            40..=59 => EvaluationLevel::NeedsImprovement,
            _ => EvaluationLevel::Poor,
        }
    }

    /// Stable identifier used by the feedback renderer.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationLevel::Excellent => "excellent",
            EvaluationLevel::VeryGood => "very-good",
            EvaluationLevel::Good => "good",
            EvaluationLevel::NeedsImprovement => "needs-improvement",
            EvaluationLevel::Poor => "poor",
        }
    }

    /// User-facing feedback line.
    pub fn message(&self) -> &'static str {
        match self {
            EvaluationLevel::Excellent => "ممتاز! نطق رائع 🎉",
            EvaluationLevel::VeryGood => "جيد جداً! 👏",
            EvaluationLevel::Good => "جيد! واصل التدريب 👍",
            EvaluationLevel::NeedsImprovement => "جيد، لكن يمكن تحسينه 💪",
            EvaluationLevel::Poor => "حاول مرة أخرى 🔄",
        }
    }

    pub fn color(&self) -> ColorTag {
        match self {
            EvaluationLevel::Excellent => ColorTag::Green,
            EvaluationLevel::VeryGood => ColorTag::Blue,
            EvaluationLevel::Good => ColorTag::Teal,
            EvaluationLevel::NeedsImprovement => ColorTag::Yellow,
            EvaluationLevel::Poor => ColorTag::Red,
        }
    }

    /// Whether the learner is offered another attempt at the same sentence.
    pub fn allows_retry(&self) -> bool {
        !matches!(self, EvaluationLevel::Excellent)
    }
}

// ---------------------------------------------------------------------------
// EvaluationResult
// ---------------------------------------------------------------------------

/// Outcome of [`Scorer::evaluate`].  Recomputable, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub level: EvaluationLevel,
    /// Overall 0 to 100 score.
    pub score: u8,
    pub message: &'static str,
    #[serde(rename = "colorTag")]
    pub color: ColorTag,
}

impl EvaluationResult {
    fn from_score(score: u8) -> Self {
        let level = EvaluationLevel::from_score(score);
        Self {
            level,
            score,
            message: level.message(),
            color: level.color(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// Pronunciation scorer parameterised by a [`ScoringConfig`].
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Similarity of `user_text` to `original_text` on a 0 to 100 scale.
    ///
    /// Identical normalized forms short-circuit to 100.  A reference that
    /// normalizes to nothing cannot be matched and scores 0.
    pub fn score_sentence(&self, user_text: &str, original_text: &str) -> u8 {
        self.score_normalized(&normalize(user_text), &normalize(original_text))
    }

    fn score_normalized(&self, user: &str, original: &str) -> u8 {
        let original_words = tokens(original);
        if original_words.is_empty() {
            return 0;
        }
        if user == original {
            return 100;
        }
        let user_words = tokens(user);

        let mut credit = 0.0;
        for (heard, expected) in user_words.iter().zip(original_words.iter()) {
            if heard == expected {
                credit += 1.0;
                continue;
            }
            let similarity = word_similarity(heard, expected);
            if similarity >= self.config.partial_match_threshold {
                credit += similarity / 100.0;
            }
        }

        let expected_len = original_words.len() as f64;
        let length_gap = (user_words.len() as f64 - expected_len).abs();
        let penalty = length_gap / expected_len * self.config.length_penalty;
        let ratio = credit / expected_len - penalty;

        (ratio * 100.0).round().clamp(0.0, 100.0) as u8
    }

    /// Evaluate one recognized utterance.
    ///
    /// An exact normalized match scores 100 whatever the recognizer's
    /// confidence.  Otherwise the sentence score and `confidence * 100` are
    /// blended with the configured weights.
    pub fn evaluate(&self, user_text: &str, original_text: &str, confidence: f32) -> EvaluationResult {
        let user = normalize(user_text);
        let original = normalize(original_text);

        if original.is_empty() {
            return EvaluationResult::from_score(0);
        }
        if user == original {
            return EvaluationResult::from_score(100);
        }

        let sentence = self.score_normalized(&user, &original) as f64;
        let confidence = if confidence.is_finite() {
            (confidence as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let overall = sentence * self.config.text_weight
            + confidence * 100.0 * self.config.confidence_weight;

        EvaluationResult::from_score(overall.round().clamp(0.0, 100.0) as u8)
    }
}

/// [`Scorer::score_sentence`] with the default configuration.
pub fn score_sentence(user_text: &str, original_text: &str) -> u8 {
    Scorer::default().score_sentence(user_text, original_text)
}

/// [`Scorer::evaluate`] with the default configuration.
pub fn evaluate(user_text: &str, original_text: &str, confidence: f32) -> EvaluationResult {
    Scorer::default().evaluate(user_text, original_text, confidence)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
