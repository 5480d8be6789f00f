//! In-process test doubles for the platform adapters.
//!
//! Each fake records what the orchestrator asked of it and lets the test
//! decide when (and whether) the matching callback fires.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::audio::{AudioError, AudioPlayer, AudioSource};
use super::events::{EventSink, PlatformEvent, PlaybackId, SessionId};
use super::permission::{MicrophoneAccess, PermissionState};
use super::recognizer::{RecognitionError, SpeechRecognizer};

// ---------------------------------------------------------------------------
// FakeAudioPlayer
// ---------------------------------------------------------------------------

/// How [`FakeAudioPlayer`] reacts to `play`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBehaviour {
    /// Report `AudioEnded` immediately.
    AutoEnd,
    /// Report `AudioFailed` immediately.
    AutoFail,
    /// Stay playing until the test calls [`FakeAudioPlayer::finish`].
    Manual,
    /// Refuse synchronously with an [`AudioError`].
    Refuse,
}

pub struct FakeAudioPlayer {
    behaviour: AudioBehaviour,
    plays: Mutex<Vec<(PlaybackId, AudioSource)>>,
    current: Mutex<Option<(PlaybackId, EventSink)>>,
    pauses: Mutex<usize>,
    rate_changes: Mutex<Vec<f32>>,
}

impl FakeAudioPlayer {
    pub fn new(behaviour: AudioBehaviour) -> Self {
        Self {
            behaviour,
            plays: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            pauses: Mutex::new(0),
            rate_changes: Mutex::new(Vec::new()),
        }
    }

    pub fn plays(&self) -> Vec<(PlaybackId, AudioSource)> {
        self.plays.lock().unwrap().clone()
    }

    pub fn pause_count(&self) -> usize {
        *self.pauses.lock().unwrap()
    }

    /// Rates applied to an already-playing clip, in order.
    pub fn rate_changes(&self) -> Vec<f32> {
        self.rate_changes.lock().unwrap().clone()
    }

    pub fn is_playing(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }

    /// End the current clip (Manual mode).  Returns the id that ended.
    pub fn finish(&self) -> Option<PlaybackId> {
        let (id, sink) = self.current.lock().unwrap().take()?;
        let _ = sink.send(PlatformEvent::AudioEnded(id));
        Some(id)
    }
}

impl AudioPlayer for FakeAudioPlayer {
    fn play(
        &self,
        id: PlaybackId,
        source: &AudioSource,
        _rate: f32,
        sink: EventSink,
    ) -> Result<(), AudioError> {
        self.plays.lock().unwrap().push((id, source.clone()));
        match self.behaviour {
            AudioBehaviour::AutoEnd => {
                let _ = sink.send(PlatformEvent::AudioEnded(id));
            }
            AudioBehaviour::AutoFail => {
                let _ = sink.send(PlatformEvent::AudioFailed {
                    id,
                    reason: "decode error".into(),
                });
            }
            AudioBehaviour::Manual => {
                *self.current.lock().unwrap() = Some((id, sink));
            }
            AudioBehaviour::Refuse => {
                return Err(AudioError::Unavailable("no output device".into()));
            }
        }
        Ok(())
    }

    fn pause(&self) {
        *self.pauses.lock().unwrap() += 1;
        self.current.lock().unwrap().take();
    }

    fn set_rate(&self, rate: f32) {
        if self.current.lock().unwrap().is_some() {
            self.rate_changes.lock().unwrap().push(rate);
        }
    }
}

// ---------------------------------------------------------------------------
// FakeRecognizer
// ---------------------------------------------------------------------------

/// Scripted recognizer.
///
/// Queued responses are delivered immediately on `start`; with an empty
/// queue the session stays open until [`respond`](Self::respond) or
/// [`fail`](Self::fail).
pub struct FakeRecognizer {
    supported: bool,
    start_error: Option<RecognitionError>,
    script: Mutex<VecDeque<Result<(String, f32), RecognitionError>>>,
    active: Mutex<Option<(SessionId, EventSink)>>,
    starts: Mutex<Vec<SessionId>>,
    aborts: Mutex<usize>,
    overlapping_starts: Mutex<usize>,
}

impl FakeRecognizer {
    pub fn new() -> Self {
        Self {
            supported: true,
            start_error: None,
            script: Mutex::new(VecDeque::new()),
            active: Mutex::new(None),
            starts: Mutex::new(Vec::new()),
            aborts: Mutex::new(0),
            overlapping_starts: Mutex::new(0),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn failing_start(error: RecognitionError) -> Self {
        Self {
            start_error: Some(error),
            ..Self::new()
        }
    }

    /// Queue a transcript to be returned by a future session.
    pub fn push_transcript(&self, transcript: &str, confidence: f32) {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok((transcript.to_string(), confidence)));
    }

    /// Queue an error to be returned by a future session.
    pub fn push_error(&self, error: RecognitionError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Answer the live session.  Returns `false` when no session is live.
    pub fn respond(&self, transcript: &str, confidence: f32) -> bool {
        match self.active.lock().unwrap().take() {
            Some((session, sink)) => {
                let _ = sink.send(PlatformEvent::Recognized {
                    session,
                    transcript: transcript.to_string(),
                    confidence,
                });
                true
            }
            None => false,
        }
    }

    pub fn fail(&self, error: RecognitionError) -> bool {
        match self.active.lock().unwrap().take() {
            Some((session, sink)) => {
                let _ = sink.send(PlatformEvent::RecognitionFailed { session, error });
                true
            }
            None => false,
        }
    }

    pub fn starts(&self) -> Vec<SessionId> {
        self.starts.lock().unwrap().clone()
    }

    pub fn abort_count(&self) -> usize {
        *self.aborts.lock().unwrap()
    }

    pub fn is_listening(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }

    /// Number of times `start` was called while a session was still live.
    pub fn overlapping_starts(&self) -> usize {
        *self.overlapping_starts.lock().unwrap()
    }
}

impl SpeechRecognizer for FakeRecognizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start(
        &self,
        session: SessionId,
        _language: &str,
        sink: EventSink,
    ) -> Result<(), RecognitionError> {
        if let Some(err) = &self.start_error {
            return Err(err.clone());
        }
        self.starts.lock().unwrap().push(session);

        let mut active = self.active.lock().unwrap();
        if active.is_some() {
            *self.overlapping_starts.lock().unwrap() += 1;
        }

        match self.script.lock().unwrap().pop_front() {
            Some(Ok((transcript, confidence))) => {
                *active = None;
                let _ = sink.send(PlatformEvent::Recognized {
                    session,
                    transcript,
                    confidence,
                });
            }
            Some(Err(error)) => {
                *active = None;
                let _ = sink.send(PlatformEvent::RecognitionFailed { session, error });
            }
            None => *active = Some((session, sink)),
        }
        Ok(())
    }

    fn abort(&self) {
        *self.aborts.lock().unwrap() += 1;
        self.active.lock().unwrap().take();
    }
}

// ---------------------------------------------------------------------------
// FakeMicrophone
// ---------------------------------------------------------------------------

pub struct FakeMicrophone {
    current: Mutex<PermissionState>,
    on_request: PermissionState,
    requests: Mutex<usize>,
}

impl FakeMicrophone {
    /// `current` is what `query` reports; `on_request` is what a request
    /// resolves to.
    pub fn new(current: PermissionState, on_request: PermissionState) -> Self {
        Self {
            current: Mutex::new(current),
            on_request,
            requests: Mutex::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionState::Granted, PermissionState::Granted)
    }

    pub fn request_count(&self) -> usize {
        *self.requests.lock().unwrap()
    }
}

#[async_trait]
impl MicrophoneAccess for FakeMicrophone {
    async fn query(&self) -> PermissionState {
        *self.current.lock().unwrap()
    }

    async fn request(&self) -> PermissionState {
        *self.requests.lock().unwrap() += 1;
        *self.current.lock().unwrap() = self.on_request;
        self.on_request
    }
}
