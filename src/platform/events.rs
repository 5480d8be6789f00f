//! Callback events raised by platform adapters and timers.
//!
//! Every asynchronous platform operation is tagged with the id it was
//! started under.  The lesson state machine compares that id with the one it
//! currently considers active, so a late callback from an aborted session or
//! a paused clip is recognised as stale and ignored.

use std::fmt;

use tokio::sync::mpsc;

use super::permission::PermissionState;
use super::recognizer::RecognitionError;

macro_rules! handle_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

handle_id!(
    /// One audio playback (reference clip, sentence replay or spoken word).
    PlaybackId
);
handle_id!(
    /// One speech-recognition session.
    SessionId
);
handle_id!(
    /// One scheduled delay.
    TimerId
);

/// Completion / failure notifications delivered back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    /// Playback `id` reached its end.
    AudioEnded(PlaybackId),
    /// Playback `id` could not be loaded or played.
    AudioFailed { id: PlaybackId, reason: String },
    /// Recognition session produced a final transcript.
    Recognized {
        session: SessionId,
        transcript: String,
        /// Recognizer-reported certainty, 0 to 1.
        confidence: f32,
    },
    /// Recognition session ended with an error.
    RecognitionFailed {
        session: SessionId,
        error: RecognitionError,
    },
    /// Microphone permission was queried, requested or changed externally.
    PermissionChanged(PermissionState),
    /// Scheduled delay `id` elapsed.
    TimerFired(TimerId),
}

/// Channel end handed to adapters so they can report back.
pub type EventSink = mpsc::UnboundedSender<PlatformEvent>;
