//! Lesson pipeline: the playback / recording state machine and the async
//! orchestrator that drives it.
//!
//! # Architecture
//!
//! ```text
//! LessonCommand (mpsc)          PlatformEvent (unbounded)
//!        │                               │
//!        └──────────────┬────────────────┘
//!                       ▼
//! LessonOrchestrator::run()  ← async tokio task
//!                       │
//!                       ├─ LessonMachine::handle(event) → Vec<Effect>
//!                       │
//!                       └─ execute effects
//!                             ├─ AudioPlayer::play / pause
//!                             ├─ SpeechRecognizer::start / abort
//!                             ├─ MicrophoneAccess::request   (spawned)
//!                             └─ timers                      (spawned sleep)
//!
//! SharedState (Arc<Mutex<LessonView>>) ←─── read by the UI whenever it redraws
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use lesson_coach::config::AppConfig;
//! use lesson_coach::lesson::Lesson;
//! use lesson_coach::pipeline::{new_shared_state, LessonCommand, LessonOrchestrator};
//! # use lesson_coach::platform::{AudioPlayer, MicrophoneAccess, SpeechRecognizer};
//! # fn make_audio() -> Arc<dyn AudioPlayer> { unimplemented!() }
//! # fn make_recognizer() -> Arc<dyn SpeechRecognizer> { unimplemented!() }
//! # fn make_microphone() -> Arc<dyn MicrophoneAccess> { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let lesson = Arc::new(Lesson::load_from("lesson.json".as_ref())?);
//!     let state = new_shared_state();
//!
//!     let (tx, rx) = mpsc::channel(16);
//!     let orchestrator = LessonOrchestrator::new(
//!         lesson,
//!         &config,
//!         state.clone(),
//!         make_audio(),
//!         make_recognizer(),
//!         make_microphone(),
//!     );
//!     tokio::spawn(orchestrator.run(rx));
//!
//!     tx.send(LessonCommand::Start).await?;
//!     Ok(())
//! }
//! ```

pub mod machine;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use machine::{Effect, LessonCommand, LessonEvent, LessonMachine};
pub use runner::LessonOrchestrator;
pub use state::{
    new_shared_state, LessonNotice, LessonPhase, LessonView, PlaybackState, RecordingAttempt,
    RecordingResult, SharedState,
};
