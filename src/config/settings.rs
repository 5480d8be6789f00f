//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a hand-edited `settings.toml`
//! only needs the keys it changes.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ScoringConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for the pronunciation scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum per-word similarity (0 to 100) for a mismatched word to earn
    /// partial credit.
    pub partial_match_threshold: f64,
    /// Weight of the relative length mismatch subtracted from the ratio.
    pub length_penalty: f64,
    /// Weight of the text similarity in the overall score.
    pub text_weight: f64,
    /// Weight of the recognizer confidence in the overall score.
    pub confidence_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            partial_match_threshold: 70.0,
            length_penalty: 0.3,
            text_weight: 0.85,
            confidence_weight: 0.15,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Lesson playback and sequencing behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Prompt for a spoken attempt after every sentence.  When `false` the
    /// lesson reads straight through.
    pub pronunciation_enabled: bool,
    /// Restart the lesson automatically after the last sentence.
    pub loop_enabled: bool,
    /// Scroll the active sentence into view on every transition.
    pub auto_scroll: bool,
    /// Reference audio playback rate (0.5 to 2.0).
    pub playback_rate: f32,
    /// Pause between "continue" and the next sentence.
    pub continue_delay_ms: u64,
    /// Pause between sentences when pronunciation practice is off.
    pub auto_advance_delay_ms: u64,
    /// Stand-in duration for a sentence that has no reference audio.
    pub no_audio_delay_ms: u64,
    /// Pause before a looped lesson starts over.
    pub loop_delay_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            pronunciation_enabled: true,
            loop_enabled: false,
            auto_scroll: true,
            playback_rate: 1.0,
            continue_delay_ms: 1_000,
            auto_advance_delay_ms: 500,
            no_audio_delay_ms: 300,
            loop_delay_ms: 400,
        }
    }
}

impl PlaybackConfig {
    pub fn continue_delay(&self) -> Duration {
        Duration::from_millis(self.continue_delay_ms)
    }

    pub fn auto_advance_delay(&self) -> Duration {
        Duration::from_millis(self.auto_advance_delay_ms)
    }

    pub fn no_audio_delay(&self) -> Duration {
        Duration::from_millis(self.no_audio_delay_ms)
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(self.loop_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// RecognitionConfig
// ---------------------------------------------------------------------------

/// Speech recognition and word pronunciation (TTS) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// BCP-47 language tag passed to the recognizer.
    pub language: String,
    /// Preferred synthesis voice for single-word playback.
    pub voice_name: String,
    /// Synthesis language used when the preferred voice is unavailable.
    pub voice_language: String,
    /// Recorded word clip to fall back on when synthesis fails.  `{word}` is
    /// replaced by the lowercased word; empty disables the fallback.
    pub word_audio_url: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: "en-US".into(),
            voice_name: "Google UK English Female".into(),
            voice_language: "en-GB".into(),
            word_audio_url: "https://cdn13674550.b-cdn.net/SNA-audio/words/{word}.mp3".into(),
        }
    }
}

impl RecognitionConfig {
    /// Fallback clip for a single synthesized word, if one is configured.
    pub fn word_audio_fallback(&self, text: &str) -> Option<String> {
        let word = text.trim();
        if self.word_audio_url.is_empty() || word.is_empty() || word.contains(char::is_whitespace) {
            return None;
        }
        Some(self.word_audio_url.replace("{word}", &word.to_lowercase()))
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use lesson_coach::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pronunciation scorer tuning.
    pub scoring: ScoringConfig,
    /// Lesson sequencing behaviour.
    pub playback: PlaybackConfig,
    /// Speech recognition / synthesis settings.
    pub recognition: RecognitionConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
