//! Speech recognition adapter.
//!
//! [`SpeechRecognizer`] is the narrow interface the orchestrator drives:
//! start a session, abort it, and receive exactly one
//! [`PlatformEvent::Recognized`](super::PlatformEvent::Recognized) or
//! [`PlatformEvent::RecognitionFailed`](super::PlatformEvent::RecognitionFailed)
//! through the [`EventSink`] for that session.

use thiserror::Error;

use super::events::{EventSink, SessionId};

// ---------------------------------------------------------------------------
// RecognitionError
// ---------------------------------------------------------------------------

/// Why a recognition session produced no transcript.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    /// The session ended without detecting any speech.
    #[error("no speech detected")]
    NoSpeech,

    /// The microphone could not be opened or stopped delivering audio.
    #[error("audio capture failed")]
    AudioCapture,

    /// Microphone access was refused or revoked.
    #[error("microphone permission denied")]
    NotAllowed,

    /// The platform has no speech recognition service.
    #[error("speech recognition is not supported on this platform")]
    Unsupported,

    /// The recognition service could not be reached.
    #[error("network error during recognition")]
    Network,

    /// The session was aborted before it produced a result.
    #[error("recognition aborted")]
    Aborted,

    #[error("recognition failed: {0}")]
    Other(String),
}

impl RecognitionError {
    /// Map a platform error code (`"no-speech"`, `"not-allowed"`, …) to a
    /// variant.  Unknown codes are kept verbatim in [`Other`](Self::Other).
    ///
    /// ```
    /// use lesson_coach::platform::RecognitionError;
    ///
    /// assert_eq!(RecognitionError::from_code("no-speech"), RecognitionError::NoSpeech);
    /// assert_eq!(RecognitionError::from_code("service-not-allowed"), RecognitionError::NotAllowed);
    /// ```
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => RecognitionError::NoSpeech,
            "audio-capture" => RecognitionError::AudioCapture,
            "not-allowed" | "service-not-allowed" => RecognitionError::NotAllowed,
            "network" => RecognitionError::Network,
            "aborted" => RecognitionError::Aborted,
            "language-not-supported" => RecognitionError::Unsupported,
            other => RecognitionError::Other(other.to_string()),
        }
    }

    /// Localized diagnostic shown to the learner in the result panel.
    pub fn user_message(&self) -> &'static str {
        match self {
            RecognitionError::NoSpeech => "لم يتم سماع أي صوت. حاول مرة أخرى.",
            RecognitionError::AudioCapture => {
                "تعذر الوصول إلى الميكروفون. تأكد من توصيله وحاول مرة أخرى."
            }
            RecognitionError::NotAllowed => {
                "تم رفض إذن الميكروفون. الرجاء السماح بالوصول للميكروفون."
            }
            RecognitionError::Unsupported => {
                "التسجيل الصوتي غير مدعوم في متصفحك. جرب Chrome أو Edge"
            }
            RecognitionError::Network => "حدث خطأ في الشبكة أثناء التعرف على الصوت. حاول مرة أخرى.",
            RecognitionError::Aborted | RecognitionError::Other(_) => {
                "حدث خطأ أثناء التسجيل. حاول مرة أخرى."
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechRecognizer trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface to the platform recognizer.
///
/// # Contract
///
/// - At most one session is live; the orchestrator always calls
///   [`abort`](Self::abort) before starting another.
/// - `abort` on an idle recognizer is a no-op.
/// - After `abort`, no further events are sent for the aborted session
///   (any that race through are discarded by id).
pub trait SpeechRecognizer: Send + Sync {
    /// Whether the platform offers speech recognition at all.
    fn is_supported(&self) -> bool;

    /// Begin listening.  The single outcome for `session` is reported
    /// through `sink`.  A synchronous `Err` means the session never started.
    fn start(&self, session: SessionId, language: &str, sink: EventSink)
        -> Result<(), RecognitionError>;

    /// Stop listening and discard any pending result.
    fn abort(&self);
}

// Compile-time assertion: Box<dyn SpeechRecognizer> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SpeechRecognizer>) {}
};
