//! Lesson phases, playback state and the shared view state.
//!
//! [`LessonPhase`] names where the lesson state machine currently is.  The
//! UI reads it via [`SharedState`] to decide which controls to render.
//!
//! [`LessonView`] is the single source of truth for everything the UI needs:
//! phase, sequencing flags, progress, per-sentence scores, the current
//! recording result and any banner.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<LessonView>>`, cheap to
//! clone and safe to share across threads.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;

use crate::lesson::SentenceId;
use crate::platform::{PermissionState, RecognitionError};
use crate::scoring::{EvaluationResult, WordFeedback};

// ---------------------------------------------------------------------------
// LessonPhase
// ---------------------------------------------------------------------------

/// States of the lesson playback / recording machine.
///
/// ```text
/// Idle ──start──▶ PlayingReference ──audio ended│failed│no audio──▶ AwaitingRecording
/// AwaitingRecording ──start recording──▶ Recording
/// Recording ──recognized│error──▶ ShowingResult
/// ShowingResult ──retry──▶ Recording
/// ShowingResult│AwaitingRecording ──continue│skip──▶ Advancing ──delay──▶ PlayingReference
/// last sentence done ──▶ Finished (──loop delay──▶ PlayingReference)
/// any state ──stop──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LessonPhase {
    /// Nothing playing; the lesson has not started or was stopped.
    #[default]
    Idle,

    /// Reference audio for `sentences[current_index]` is playing.
    PlayingReference,

    /// Reference finished; waiting for the learner to start a recording.
    AwaitingRecording,

    /// Microphone open; a recognition session is live.
    Recording,

    /// An evaluation (or recognition error) is on screen.
    ShowingResult,

    /// A delayed move to the next sentence is pending.
    Advancing,

    /// The pass completed.  A loop restart may be pending.
    Finished,
}

impl LessonPhase {
    /// Returns `true` while the machine is playing or listening on its own.
    ///
    /// ```
    /// use lesson_coach::pipeline::LessonPhase;
    ///
    /// assert!(!LessonPhase::Idle.is_busy());
    /// assert!(LessonPhase::PlayingReference.is_busy());
    /// assert!(LessonPhase::Recording.is_busy());
    /// assert!(!LessonPhase::ShowingResult.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            LessonPhase::PlayingReference | LessonPhase::Recording | LessonPhase::Advancing
        )
    }

    /// A short human-readable label suitable for a status line.
    pub fn label(&self) -> &'static str {
        match self {
            LessonPhase::Idle => "Idle",
            LessonPhase::PlayingReference => "Listening",
            LessonPhase::AwaitingRecording => "Your turn",
            LessonPhase::Recording => "Recording",
            LessonPhase::ShowingResult => "Result",
            LessonPhase::Advancing => "Next sentence",
            LessonPhase::Finished => "Done",
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackState
// ---------------------------------------------------------------------------

/// Sequencing flags for one lesson-view lifecycle.
///
/// `current_index` is the next sentence to play; while a recording prompt or
/// result is up it already points one past the sentence being practised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PlaybackState {
    pub current_index: usize,
    pub is_reading: bool,
    pub should_stop: bool,
    pub is_recording: bool,
    pub is_waiting_for_recording: bool,
}

// ---------------------------------------------------------------------------
// RecordingAttempt / RecordingResult
// ---------------------------------------------------------------------------

/// What the recognizer produced for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingAttempt {
    pub transcript: String,
    /// Recognizer-reported certainty, 0 to 1.
    pub confidence: f32,
    pub success: bool,
}

/// The attempt plus everything the feedback panel renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingResult {
    pub sentence_id: SentenceId,
    pub original_text: String,
    pub attempt: RecordingAttempt,
    /// `None` when recognition failed.
    pub evaluation: Option<EvaluationResult>,
    /// Localized diagnostic for a failed attempt.
    pub diagnostic: Option<&'static str>,
    #[serde(skip)]
    pub error: Option<RecognitionError>,
    pub words: Vec<WordFeedback>,
}

impl RecordingResult {
    /// Retry is offered after a failed attempt or a score judged insufficient.
    pub fn allows_retry(&self) -> bool {
        match &self.evaluation {
            Some(evaluation) if self.attempt.success => evaluation.level.allows_retry(),
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// LessonNotice
// ---------------------------------------------------------------------------

/// Persistent, dismissable banners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
pub enum LessonNotice {
    /// Microphone access refused.  Recording stays blocked until granted.
    #[error("إذن الميكروفون مغلق. لن تتمكن من تسجيل نطقك. الرجاء السماح بالوصول إلى الميكروفون في إعدادات المتصفح.")]
    PermissionDenied,

    /// No speech recognition on this platform.  Raised once per session.
    #[error("التسجيل الصوتي غير مدعوم في متصفحك. جرب Chrome أو Edge")]
    RecognitionUnsupported,
}

// ---------------------------------------------------------------------------
// LessonView
// ---------------------------------------------------------------------------

/// Shared view state: the single source of truth for the UI.
///
/// Held behind [`SharedState`].  The orchestrator publishes into it after
/// every event; the UI reads it whenever it redraws.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LessonView {
    pub phase: LessonPhase,
    pub playback: PlaybackState,
    /// 0 to 100.
    pub progress: f32,
    /// Sentence highlighted as "being read".
    pub active_sentence: Option<SentenceId>,
    /// Sentence the UI should scroll into view.
    pub scroll_target: Option<SentenceId>,
    /// Latest score per sentence for this view.
    pub scores: BTreeMap<SentenceId, u8>,
    pub result: Option<RecordingResult>,
    pub notice: Option<LessonNotice>,
    pub permission: PermissionState,
    pub recognition_supported: bool,
    pub loop_enabled: bool,
    pub playback_rate: f32,
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`LessonView`].
///
/// Cheap to clone (`Arc` clone).  Hold the lock only for a short critical
/// section; do **not** hold it across `.await` points.
pub type SharedState = Arc<Mutex<LessonView>>;

/// Construct a new [`SharedState`] wrapping a default [`LessonView`].
pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(LessonView::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
