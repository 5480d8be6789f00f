//! Platform adapters: speech recognition, audio playback, microphone
//! permission.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────┐
//!   commands ───▶ │    LessonOrchestrator     │ ◀─── PlatformEvent (EventSink)
//!                 └──┬──────────┬─────────┬──┘              ▲
//!                    │          │         │                 │
//!                    ▼          ▼         ▼                 │
//!             AudioPlayer  SpeechRecognizer  MicrophoneAccess
//!               play/pause   start/abort     query/request ─┘
//! ```
//!
//! Adapters never call back into the orchestrator directly: every outcome is
//! a [`PlatformEvent`] tagged with the id of the operation it belongs to.

pub mod audio;
pub mod events;
pub mod permission;
pub mod recognizer;

#[cfg(test)]
pub mod fake;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use audio::{AudioError, AudioPlayer, AudioSource};
pub use events::{EventSink, PlatformEvent, PlaybackId, SessionId, TimerId};
pub use permission::{MicrophoneAccess, PermissionState};
pub use recognizer::{RecognitionError, SpeechRecognizer};

// test-only re-export so the pipeline tests can build fakes without the
// `platform::fake::` prefix.
#[cfg(test)]
pub use fake::{AudioBehaviour, FakeAudioPlayer, FakeMicrophone, FakeRecognizer};
