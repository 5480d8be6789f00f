//! Lesson orchestrator: drives [`LessonMachine`] against the platform
//! adapters.
//!
//! [`LessonOrchestrator`] owns the machine and the [`SharedState`].  It
//! listens on two channels at once:
//!
//! ```text
//! LessonCommand (mpsc, from the UI) ──┐
//!                                     ├─▶ LessonMachine::handle ─▶ Vec<Effect>
//! PlatformEvent (unbounded, adapters)─┘                               │
//!        ▲                                                            ▼
//!        └──── AudioPlayer / SpeechRecognizer / timers / permission ◀─ execute
//! ```
//!
//! After every event the machine's state is published into the shared view.
//! Adapter calls are synchronous and cheap; a refused call is turned into
//! the matching failure event so the machine sees one code path.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::lesson::Lesson;
use crate::platform::{
    AudioPlayer, AudioSource, EventSink, MicrophoneAccess, PlatformEvent, PlaybackId, SessionId,
    SpeechRecognizer, TimerId,
};

use super::machine::{Effect, LessonCommand, LessonEvent, LessonMachine};
use super::state::SharedState;

// ---------------------------------------------------------------------------
// LessonOrchestrator
// ---------------------------------------------------------------------------

/// Drives one lesson view.
///
/// Create with [`LessonOrchestrator::new`], then call [`run`](Self::run)
/// inside a tokio task.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use lesson_coach::config::AppConfig;
/// use lesson_coach::lesson::Lesson;
/// use lesson_coach::pipeline::{new_shared_state, LessonCommand, LessonOrchestrator};
/// # use lesson_coach::platform::{AudioPlayer, MicrophoneAccess, SpeechRecognizer};
/// # fn make_audio() -> Arc<dyn AudioPlayer> { unimplemented!() }
/// # fn make_recognizer() -> Arc<dyn SpeechRecognizer> { unimplemented!() }
/// # fn make_microphone() -> Arc<dyn MicrophoneAccess> { unimplemented!() }
///
/// # async fn example() -> anyhow::Result<()> {
/// let lesson = Arc::new(Lesson::from_json(r#"{"sentences":[{"id":1,"text":"Hello"}]}"#)?);
/// let state = new_shared_state();
///
/// let (tx, rx) = tokio::sync::mpsc::channel(16);
/// let orchestrator = LessonOrchestrator::new(
///     lesson,
///     &AppConfig::default(),
///     state.clone(),
///     make_audio(),
///     make_recognizer(),
///     make_microphone(),
/// );
/// tokio::spawn(orchestrator.run(rx));
/// tx.send(LessonCommand::Start).await?;
/// # Ok(())
/// # }
/// ```
pub struct LessonOrchestrator {
    machine: LessonMachine,
    state: SharedState,
    audio: Arc<dyn AudioPlayer>,
    recognizer: Arc<dyn SpeechRecognizer>,
    microphone: Arc<dyn MicrophoneAccess>,
    events: EventSink,
    inbox: mpsc::UnboundedReceiver<PlatformEvent>,
    timers: HashMap<TimerId, JoinHandle<()>>,
}

impl LessonOrchestrator {
    /// Create a new orchestrator.
    ///
    /// # Arguments
    ///
    /// * `lesson`    : the sentences to practise.
    /// * `config`    : playback, recognition and scoring settings.
    /// * `state`     : shared view state (also read by the UI).
    /// * `audio`     : the single audio output.
    /// * `recognizer`: speech recognition; its support flag is read once here.
    /// * `microphone`: permission query / request.
    pub fn new(
        lesson: Arc<Lesson>,
        config: &AppConfig,
        state: SharedState,
        audio: Arc<dyn AudioPlayer>,
        recognizer: Arc<dyn SpeechRecognizer>,
        microphone: Arc<dyn MicrophoneAccess>,
    ) -> Self {
        let supported = recognizer.is_supported();
        if !supported {
            log::warn!("lesson: speech recognition not available on this platform");
        }
        let machine = LessonMachine::new(
            lesson,
            config.playback.clone(),
            config.recognition.clone(),
            config.scoring.clone(),
            supported,
        );
        let (events, inbox) = mpsc::unbounded_channel();

        let orchestrator = Self {
            machine,
            state,
            audio,
            recognizer,
            microphone,
            events,
            inbox,
            timers: HashMap::new(),
        };
        orchestrator.publish();
        orchestrator
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until `commands` is closed, then stop the lesson and release
    /// every platform resource.
    pub async fn run(mut self, mut commands: mpsc::Receiver<LessonCommand>) {
        let permission = self.microphone.query().await;
        self.dispatch(PlatformEvent::PermissionChanged(permission).into());

        loop {
            let event: LessonEvent = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => command.into(),
                    None => break,
                },
                Some(event) = self.inbox.recv() => event.into(),
            };
            self.dispatch(event);
        }

        self.dispatch(LessonCommand::Stop.into());
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        log::info!("lesson: command channel closed, orchestrator shutting down");
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn dispatch(&mut self, event: LessonEvent) {
        for effect in self.machine.handle(event) {
            self.execute(effect);
        }
        self.publish();
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::PlayAudio { id, source, rate } => self.play(id, &source, rate),
            Effect::PauseAudio => self.audio.pause(),
            Effect::SetRate(rate) => self.audio.set_rate(rate),
            Effect::StartRecognition { session, language } => {
                self.start_recognition(session, &language);
            }
            Effect::AbortRecognition => self.recognizer.abort(),
            Effect::RequestPermission => {
                let microphone = Arc::clone(&self.microphone);
                let events = self.events.clone();
                tokio::spawn(async move {
                    let permission = microphone.request().await;
                    let _ = events.send(PlatformEvent::PermissionChanged(permission));
                });
            }
            Effect::Schedule { timer, delay } => self.schedule(timer, delay),
            Effect::CancelTimer(timer) => {
                if let Some(handle) = self.timers.remove(&timer) {
                    handle.abort();
                }
            }
            Effect::ScrollTo(sentence) => {
                self.state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .scroll_target = Some(sentence);
            }
        }
    }

    fn play(&self, id: PlaybackId, source: &AudioSource, rate: f32) {
        if let Err(e) = self.audio.play(id, source, rate, self.events.clone()) {
            log::warn!("lesson: could not start playback {id}: {e}");
            let _ = self.events.send(PlatformEvent::AudioFailed {
                id,
                reason: e.to_string(),
            });
        }
    }

    fn start_recognition(&self, session: SessionId, language: &str) {
        log::debug!("lesson: recognition session {session} ({language})");
        if let Err(error) = self.recognizer.start(session, language, self.events.clone()) {
            log::warn!("lesson: recognizer refused to start: {error}");
            let _ = self
                .events
                .send(PlatformEvent::RecognitionFailed { session, error });
        }
    }

    fn schedule(&mut self, timer: TimerId, delay: Duration) {
        self.timers.retain(|_, handle| !handle.is_finished());

        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(PlatformEvent::TimerFired(timer));
        });
        self.timers.insert(timer, handle);
    }

    fn publish(&self) {
        let mut view = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.machine.publish(&mut view);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
