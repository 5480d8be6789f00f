//! Audio playback adapter.
//!
//! The orchestrator owns the single "current audio element"; other
//! components ask it for playback instead of touching the player directly.

use thiserror::Error;

use super::events::{EventSink, PlaybackId};

/// What to play.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// A reference recording.
    Url(String),
    /// Text to synthesize (single-word pronunciation).
    Speech {
        text: String,
        voice: String,
        language: String,
    },
}

/// Playback could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    #[error("failed to play {source_desc}: {reason}")]
    Playback { source_desc: String, reason: String },
}

/// Object-safe, thread-safe interface to the platform audio output.
///
/// # Contract
///
/// - `play` replaces whatever was playing; the replaced clip reports nothing
///   further.
/// - Exactly one `AudioEnded` or `AudioFailed` is sent for `id` unless the
///   clip is paused or replaced first.
/// - `pause` on an idle player is a no-op.
/// - `set_rate` retunes the clip that is playing now; on an idle player it
///   is a no-op.
pub trait AudioPlayer: Send + Sync {
    fn play(&self, id: PlaybackId, source: &AudioSource, rate: f32, sink: EventSink)
        -> Result<(), AudioError>;

    fn pause(&self);

    fn set_rate(&self, rate: f32);
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn AudioPlayer>) {}
};
