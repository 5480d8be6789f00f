//! Lesson playback / recording state machine.
//!
//! [`LessonMachine::handle`] is the single transition function.  It takes a
//! [`LessonEvent`] (a learner command or a platform callback) and returns the
//! [`Effect`]s the runner must carry out.  It never performs I/O itself, so
//! every transition and guard can be unit-tested without a browser, a
//! microphone or a clock.
//!
//! # Stale callbacks
//!
//! Audio playbacks, recognition sessions and timers are each issued a fresh
//! id.  The machine remembers only the active one of each kind; a callback
//! carrying any other id, or arriving after `should_stop` was set, changes
//! nothing.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{PlaybackConfig, RecognitionConfig, ScoringConfig};
use crate::lesson::{speech_word, Lesson, Sentence, SentenceId};
use crate::platform::{
    AudioSource, PermissionState, PlatformEvent, PlaybackId, RecognitionError, SessionId, TimerId,
};
use crate::scoring::{word_feedback, Scorer};

use super::state::{
    LessonNotice, LessonPhase, LessonView, PlaybackState, RecordingAttempt, RecordingResult,
};

/// Reference playback rate bounds.
const MIN_PLAYBACK_RATE: f32 = 0.5;
const MAX_PLAYBACK_RATE: f32 = 2.0;
/// Word synthesis rate bounds.
const MIN_SPEECH_RATE: f32 = 0.4;
const MAX_SPEECH_RATE: f32 = 2.0;
/// Rates of the "listen" and "listen slowly" model readings.
const LISTEN_RATE: f32 = 1.0;
const LISTEN_SLOW_RATE: f32 = 0.75;

// ---------------------------------------------------------------------------
// Events / effects
// ---------------------------------------------------------------------------

/// Learner-initiated commands.
#[derive(Debug, Clone, PartialEq)]
pub enum LessonCommand {
    /// Start a fresh pass from the first sentence.
    Start,
    /// Abort everything and reset to the beginning.
    Stop,
    /// `Stop` while reading, otherwise `Start`.
    TogglePlayPause,
    /// Open the microphone for the sentence just played.
    StartRecording,
    /// Dismiss the result and move to the next sentence.
    Continue,
    /// Record the same sentence again.
    Retry,
    /// Move on without recording.
    Skip,
    SetLoop(bool),
    SetPlaybackRate(f32),
    /// Pronounce a single word (word-lookup sidebar).
    PlayWord(String),
    /// Replay one sentence's reference audio.
    PlaySentence(SentenceId),
    /// Read the sentence being practised aloud by synthesis, at normal or
    /// slow speed.  Offered on the recording prompt and the result.
    ListenPractised { slow: bool },
    /// Ask for microphone access without starting a recording.
    RequestPermission,
    DismissNotice,
}

/// Everything that can drive a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum LessonEvent {
    Command(LessonCommand),
    Platform(PlatformEvent),
}

impl From<LessonCommand> for LessonEvent {
    fn from(command: LessonCommand) -> Self {
        LessonEvent::Command(command)
    }
}

impl From<PlatformEvent> for LessonEvent {
    fn from(event: PlatformEvent) -> Self {
        LessonEvent::Platform(event)
    }
}

/// Side effects requested by a transition, executed in order by the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    PlayAudio {
        id: PlaybackId,
        source: AudioSource,
        rate: f32,
    },
    PauseAudio,
    /// Change the speed of the clip that is playing now.
    SetRate(f32),
    StartRecognition {
        session: SessionId,
        language: String,
    },
    AbortRecognition,
    RequestPermission,
    Schedule {
        timer: TimerId,
        delay: Duration,
    },
    CancelTimer(TimerId),
    ScrollTo(SentenceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerPurpose {
    /// Stand-in for a reference clip the sentence does not have.
    NoAudio,
    NextSentence,
    LoopRestart,
}

/// Playback outside the reference sequence (word, model reading, replay).
#[derive(Debug, Clone, PartialEq)]
struct SidePlayback {
    id: PlaybackId,
    /// Recorded clip, not synthesis: follows playback rate changes.
    is_clip: bool,
    /// Clip to try when synthesis fails, with its rate.
    fallback: Option<(String, f32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermissionFollowUp {
    None,
    /// Start capturing once access is granted.
    Capture,
}

// ---------------------------------------------------------------------------
// LessonMachine
// ---------------------------------------------------------------------------

/// State machine for one lesson-view lifecycle.
pub struct LessonMachine {
    lesson: Arc<Lesson>,
    playback: PlaybackConfig,
    recognition: RecognitionConfig,
    scorer: Scorer,

    phase: LessonPhase,
    state: PlaybackState,
    progress: f32,
    active_sentence: Option<SentenceId>,
    scores: BTreeMap<SentenceId, u8>,
    result: Option<RecordingResult>,
    notice: Option<LessonNotice>,

    permission: PermissionState,
    permission_follow_up: Option<PermissionFollowUp>,
    recognition_supported: bool,
    unsupported_reported: bool,

    reference_playback: Option<PlaybackId>,
    side_playback: Option<SidePlayback>,
    session: Option<SessionId>,
    timer: Option<(TimerId, TimerPurpose)>,
    next_id: u64,
}

impl LessonMachine {
    pub fn new(
        lesson: Arc<Lesson>,
        playback: PlaybackConfig,
        recognition: RecognitionConfig,
        scoring: ScoringConfig,
        recognition_supported: bool,
    ) -> Self {
        let mut playback = playback;
        playback.playback_rate = clamp_rate(playback.playback_rate, MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
            .unwrap_or(1.0);

        Self {
            lesson,
            playback,
            recognition,
            scorer: Scorer::new(scoring),
            phase: LessonPhase::Idle,
            state: PlaybackState::default(),
            progress: 0.0,
            active_sentence: None,
            scores: BTreeMap::new(),
            result: None,
            notice: None,
            permission: PermissionState::Unknown,
            permission_follow_up: None,
            recognition_supported,
            unsupported_reported: false,
            reference_playback: None,
            side_playback: None,
            session: None,
            timer: None,
            next_id: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> LessonPhase {
        self.phase
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn scores(&self) -> &BTreeMap<SentenceId, u8> {
        &self.scores
    }

    pub fn result(&self) -> Option<&RecordingResult> {
        self.result.as_ref()
    }

    pub fn notice(&self) -> Option<LessonNotice> {
        self.notice
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    /// `true` while any playback, recognition session or timer is live.
    pub fn has_pending_work(&self) -> bool {
        self.reference_playback.is_some()
            || self.side_playback.is_some()
            || self.session.is_some()
            || self.timer.is_some()
    }

    /// Copy the machine's state into the shared view.
    pub fn publish(&self, view: &mut LessonView) {
        view.phase = self.phase;
        view.playback = self.state;
        view.progress = self.progress;
        view.active_sentence = self.active_sentence.clone();
        view.scores = self.scores.clone();
        view.result = self.result.clone();
        view.notice = self.notice;
        view.permission = self.permission;
        view.recognition_supported = self.recognition_supported;
        view.loop_enabled = self.playback.loop_enabled;
        view.playback_rate = self.playback.playback_rate;
        if self.phase == LessonPhase::Idle {
            view.scroll_target = None;
        }
    }

    // -----------------------------------------------------------------------
    // Transition function
    // -----------------------------------------------------------------------

    /// Apply one event and return the effects to execute, in order.
    pub fn handle(&mut self, event: impl Into<LessonEvent>) -> Vec<Effect> {
        let mut fx = Vec::new();
        match event.into() {
            LessonEvent::Command(command) => self.on_command(command, &mut fx),
            LessonEvent::Platform(event) => self.on_platform(event, &mut fx),
        }
        fx
    }

    fn on_command(&mut self, command: LessonCommand, fx: &mut Vec<Effect>) {
        log::debug!("lesson: command {command:?} in {:?}", self.phase);
        match command {
            LessonCommand::Start => self.start_pass(fx),
            LessonCommand::Stop => self.stop(fx),
            LessonCommand::TogglePlayPause => {
                if self.state.is_reading {
                    self.stop(fx);
                } else {
                    self.start_pass(fx);
                }
            }
            LessonCommand::StartRecording => {
                if matches!(self.phase, LessonPhase::AwaitingRecording | LessonPhase::Recording) {
                    self.request_capture(fx);
                } else {
                    log::debug!("lesson: StartRecording ignored in {:?}", self.phase);
                }
            }
            LessonCommand::Retry => {
                let allowed = self.phase == LessonPhase::ShowingResult
                    && self.result.as_ref().is_some_and(RecordingResult::allows_retry);
                if allowed {
                    self.request_capture(fx);
                } else {
                    log::debug!("lesson: Retry not offered in {:?}", self.phase);
                }
            }
            LessonCommand::Continue => {
                if self.phase == LessonPhase::ShowingResult {
                    self.advance_after_prompt(fx);
                }
            }
            LessonCommand::Skip => {
                if matches!(
                    self.phase,
                    LessonPhase::AwaitingRecording | LessonPhase::Recording | LessonPhase::ShowingResult
                ) {
                    self.advance_after_prompt(fx);
                }
            }
            LessonCommand::SetLoop(enabled) => {
                self.playback.loop_enabled = enabled;
                if !enabled {
                    if let Some((timer, TimerPurpose::LoopRestart)) = self.timer {
                        self.timer = None;
                        fx.push(Effect::CancelTimer(timer));
                    }
                }
            }
            LessonCommand::SetPlaybackRate(rate) => {
                match clamp_rate(rate, MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE) {
                    Some(rate) => {
                        self.playback.playback_rate = rate;
                        let clip_live = self.reference_playback.is_some()
                            || self.side_playback.as_ref().is_some_and(|side| side.is_clip);
                        if clip_live {
                            fx.push(Effect::SetRate(rate));
                        }
                    }
                    None => log::warn!("lesson: ignoring playback rate {rate}"),
                }
            }
            LessonCommand::PlayWord(word) => self.play_word(&word, fx),
            LessonCommand::PlaySentence(id) => self.play_sentence(&id, fx),
            LessonCommand::ListenPractised { slow } => self.listen_practised(slow, fx),
            LessonCommand::RequestPermission => {
                if self.permission_follow_up.is_none() {
                    self.permission_follow_up = Some(PermissionFollowUp::None);
                    fx.push(Effect::RequestPermission);
                }
            }
            LessonCommand::DismissNotice => self.notice = None,
        }
    }

    fn on_platform(&mut self, event: PlatformEvent, fx: &mut Vec<Effect>) {
        match event {
            PlatformEvent::AudioEnded(id) => self.on_audio_done(id, None, fx),
            PlatformEvent::AudioFailed { id, reason } => self.on_audio_done(id, Some(reason), fx),
            PlatformEvent::Recognized {
                session,
                transcript,
                confidence,
            } => {
                if self.accept_session(session) {
                    self.on_recognized(transcript, confidence);
                }
            }
            PlatformEvent::RecognitionFailed { session, error } => {
                if self.accept_session(session) {
                    self.on_recognition_failed(error);
                }
            }
            PlatformEvent::PermissionChanged(permission) => self.on_permission(permission, fx),
            PlatformEvent::TimerFired(id) => self.on_timer(id, fx),
        }
    }

    // -----------------------------------------------------------------------
    // Pass control
    // -----------------------------------------------------------------------

    fn start_pass(&mut self, fx: &mut Vec<Effect>) {
        if self.lesson.is_empty() {
            log::warn!("lesson: cannot start, lesson has no sentences");
            return;
        }
        self.release_resources(fx);

        self.state = PlaybackState {
            current_index: 0,
            is_reading: true,
            should_stop: false,
            is_recording: false,
            is_waiting_for_recording: false,
        };
        self.progress = 0.0;
        self.result = None;
        self.permission_follow_up = None;

        if !self.recognition_supported
            && self.playback.pronunciation_enabled
            && !self.unsupported_reported
        {
            self.unsupported_reported = true;
            self.notice = Some(LessonNotice::RecognitionUnsupported);
        }

        log::info!("lesson: starting pass over {} sentences", self.lesson.len());
        self.play_current(fx);
    }

    /// Enter `PlayingReference` for `sentences[current_index]`, or finish the
    /// pass when the index ran off the end.
    fn play_current(&mut self, fx: &mut Vec<Effect>) {
        if self.state.should_stop {
            return;
        }
        let total = self.lesson.len();
        let index = self.state.current_index;
        let Some(sentence) = self.lesson.sentence(index).cloned() else {
            self.finish_pass(fx);
            return;
        };

        self.phase = LessonPhase::PlayingReference;
        self.state.is_waiting_for_recording = false;
        self.active_sentence = Some(sentence.id.clone());
        self.progress = (index + 1) as f32 / total as f32 * 100.0;
        self.scroll_to(&sentence.id, fx);

        match &sentence.audio_url {
            Some(url) => {
                self.silence_side_playback(fx);
                let id = self.next_playback();
                self.reference_playback = Some(id);
                fx.push(Effect::PlayAudio {
                    id,
                    source: AudioSource::Url(url.clone()),
                    rate: self.playback.playback_rate,
                });
            }
            None => {
                log::debug!("lesson: sentence {} has no audio", sentence.id);
                self.schedule(TimerPurpose::NoAudio, self.playback.no_audio_delay(), fx);
            }
        }
    }

    /// The reference for `sentences[current_index]` is over (ended, failed,
    /// absent or interrupted).
    fn reference_finished(&mut self, fx: &mut Vec<Effect>) {
        self.reference_playback = None;
        let sentence_id = self
            .lesson
            .sentence(self.state.current_index)
            .map(|s| s.id.clone());
        self.state.current_index += 1;

        if self.practice_active() {
            self.phase = LessonPhase::AwaitingRecording;
            self.state.is_waiting_for_recording = true;
            if let Some(id) = sentence_id {
                self.scroll_to(&id, fx);
            }
        } else {
            self.phase = LessonPhase::Advancing;
            self.schedule(TimerPurpose::NextSentence, self.playback.auto_advance_delay(), fx);
        }
    }

    fn finish_pass(&mut self, fx: &mut Vec<Effect>) {
        log::info!("lesson: pass complete");
        self.phase = LessonPhase::Finished;
        self.state.is_reading = false;
        self.state.is_waiting_for_recording = false;
        self.active_sentence = None;
        self.progress = 100.0;

        if self.playback.loop_enabled && !self.state.should_stop {
            self.schedule(TimerPurpose::LoopRestart, self.playback.loop_delay(), fx);
        }
    }

    /// Leave the prompt/result for the current sentence and queue the next.
    fn advance_after_prompt(&mut self, fx: &mut Vec<Effect>) {
        if self.state.should_stop {
            return;
        }
        if self.session.take().is_some() {
            fx.push(Effect::AbortRecognition);
        }
        self.permission_follow_up = None;
        self.result = None;
        self.state.is_recording = false;
        self.state.is_waiting_for_recording = false;
        self.phase = LessonPhase::Advancing;
        self.schedule(TimerPurpose::NextSentence, self.playback.continue_delay(), fx);
    }

    fn stop(&mut self, fx: &mut Vec<Effect>) {
        self.release_resources(fx);
        self.state = PlaybackState {
            current_index: 0,
            is_reading: false,
            should_stop: true,
            is_recording: false,
            is_waiting_for_recording: false,
        };
        self.phase = LessonPhase::Idle;
        self.progress = 0.0;
        self.active_sentence = None;
        self.result = None;
        self.permission_follow_up = None;
    }

    /// Pause audio, abort recognition and cancel the timer, whichever are live.
    fn release_resources(&mut self, fx: &mut Vec<Effect>) {
        let had_reference = self.reference_playback.take().is_some();
        let had_side = self.side_playback.take().is_some();
        if had_reference || had_side {
            fx.push(Effect::PauseAudio);
        }
        if self.session.take().is_some() {
            fx.push(Effect::AbortRecognition);
        }
        if let Some((timer, _)) = self.timer.take() {
            fx.push(Effect::CancelTimer(timer));
        }
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    fn practice_active(&self) -> bool {
        self.playback.pronunciation_enabled && self.recognition_supported
    }

    /// Check support and permission, then start capturing.
    fn request_capture(&mut self, fx: &mut Vec<Effect>) {
        if self.state.should_stop {
            return;
        }
        if !self.recognition_supported {
            if !self.unsupported_reported {
                self.unsupported_reported = true;
                self.notice = Some(LessonNotice::RecognitionUnsupported);
            }
            return;
        }
        if !self.permission.is_granted() {
            if self.permission_follow_up != Some(PermissionFollowUp::Capture) {
                if self.permission_follow_up.is_none() {
                    fx.push(Effect::RequestPermission);
                }
                self.permission_follow_up = Some(PermissionFollowUp::Capture);
            }
            return;
        }
        self.begin_capture(fx);
    }

    fn begin_capture(&mut self, fx: &mut Vec<Effect>) {
        if self.session.take().is_some() {
            fx.push(Effect::AbortRecognition);
        }
        self.silence_side_playback(fx);

        let session = self.next_session();
        self.session = Some(session);
        self.result = None;
        self.phase = LessonPhase::Recording;
        self.state.is_recording = true;
        self.state.is_waiting_for_recording = true;
        fx.push(Effect::StartRecognition {
            session,
            language: self.recognition.language.clone(),
        });
    }

    fn accept_session(&mut self, session: SessionId) -> bool {
        let live = self.session == Some(session)
            && !self.state.should_stop
            && self.phase == LessonPhase::Recording;
        if live {
            self.session = None;
            self.state.is_recording = false;
            self.state.is_waiting_for_recording = false;
        } else {
            log::debug!("lesson: dropping stale recognition callback {session}");
        }
        live
    }

    /// Sentence the learner is practising: the one just played.
    fn practised_sentence(&self) -> Option<Sentence> {
        let index = self.state.current_index.checked_sub(1)?;
        self.lesson.sentence(index).cloned()
    }

    fn on_recognized(&mut self, transcript: String, confidence: f32) {
        let Some(sentence) = self.practised_sentence() else {
            log::warn!("lesson: recognition result with no sentence to score");
            self.phase = LessonPhase::AwaitingRecording;
            return;
        };

        let evaluation = self.scorer.evaluate(&transcript, &sentence.text, confidence);
        log::debug!(
            "lesson: sentence {} scored {} ({})",
            sentence.id,
            evaluation.score,
            evaluation.level.as_str()
        );
        self.scores.insert(sentence.id.clone(), evaluation.score);
        self.result = Some(RecordingResult {
            words: word_feedback(&transcript, &sentence.text),
            sentence_id: sentence.id,
            original_text: sentence.text,
            attempt: RecordingAttempt {
                transcript,
                confidence,
                success: true,
            },
            evaluation: Some(evaluation),
            diagnostic: None,
            error: None,
        });
        self.phase = LessonPhase::ShowingResult;
    }

    fn on_recognition_failed(&mut self, error: RecognitionError) {
        log::warn!("lesson: recognition failed: {error}");
        if error == RecognitionError::NotAllowed {
            self.permission = PermissionState::Denied;
            self.notice = Some(LessonNotice::PermissionDenied);
        }
        let Some(sentence) = self.practised_sentence() else {
            self.phase = LessonPhase::AwaitingRecording;
            return;
        };
        self.result = Some(RecordingResult {
            sentence_id: sentence.id,
            original_text: sentence.text,
            attempt: RecordingAttempt {
                transcript: String::new(),
                confidence: 0.0,
                success: false,
            },
            evaluation: None,
            diagnostic: Some(error.user_message()),
            error: Some(error),
            words: Vec::new(),
        });
        self.phase = LessonPhase::ShowingResult;
    }

    fn on_permission(&mut self, permission: PermissionState, fx: &mut Vec<Effect>) {
        log::debug!("lesson: microphone permission {permission:?}");
        self.permission = permission;
        match permission {
            PermissionState::Denied => self.notice = Some(LessonNotice::PermissionDenied),
            PermissionState::Granted if self.notice == Some(LessonNotice::PermissionDenied) => {
                self.notice = None;
            }
            _ => {}
        }

        let follow_up = self.permission_follow_up.take();
        if follow_up == Some(PermissionFollowUp::Capture)
            && permission.is_granted()
            && !self.state.should_stop
            && matches!(
                self.phase,
                LessonPhase::AwaitingRecording | LessonPhase::ShowingResult
            )
        {
            self.begin_capture(fx);
        }
    }

    // -----------------------------------------------------------------------
    // Audio
    // -----------------------------------------------------------------------

    fn on_audio_done(&mut self, id: PlaybackId, failure: Option<String>, fx: &mut Vec<Effect>) {
        if let Some(reason) = &failure {
            log::warn!("lesson: audio playback {id} failed ({reason}); continuing");
        }
        if self.reference_playback == Some(id) {
            if !self.state.should_stop && self.phase == LessonPhase::PlayingReference {
                self.reference_finished(fx);
            } else {
                self.reference_playback = None;
            }
        } else if self.side_playback.as_ref().is_some_and(|side| side.id == id) {
            let fallback = self.side_playback.take().and_then(|side| side.fallback);
            if let (Some(_), Some((url, rate))) = (&failure, fallback) {
                log::debug!("lesson: synthesis failed, playing recorded clip {url}");
                let id = self.next_playback();
                self.side_playback = Some(SidePlayback {
                    id,
                    is_clip: true,
                    fallback: None,
                });
                fx.push(Effect::PlayAudio {
                    id,
                    source: AudioSource::Url(url),
                    rate,
                });
            }
        } else {
            log::debug!("lesson: dropping stale audio callback {id}");
        }
    }

    fn play_word(&mut self, raw: &str, fx: &mut Vec<Effect>) {
        let word = speech_word(raw);
        if word.is_empty() {
            return;
        }
        if self.phase == LessonPhase::Recording {
            log::debug!("lesson: not pronouncing {word:?} while recording");
            return;
        }

        if self.reference_playback.is_some() {
            // Only one audio element: the interrupted reference counts as heard.
            fx.push(Effect::PauseAudio);
            if self.phase == LessonPhase::PlayingReference && !self.state.should_stop {
                self.reference_finished(fx);
            } else {
                self.reference_playback = None;
            }
        }
        self.speak(word, self.playback.playback_rate, fx);
    }

    fn listen_practised(&mut self, slow: bool, fx: &mut Vec<Effect>) {
        if !matches!(
            self.phase,
            LessonPhase::AwaitingRecording | LessonPhase::ShowingResult
        ) {
            log::debug!("lesson: model reading not offered in {:?}", self.phase);
            return;
        }
        let Some(sentence) = self.practised_sentence() else {
            return;
        };
        let rate = if slow { LISTEN_SLOW_RATE } else { LISTEN_RATE };
        self.speak(sentence.text, rate, fx);
    }

    /// Synthesize `text` in the side slot, replacing any side playback.
    fn speak(&mut self, text: String, rate: f32, fx: &mut Vec<Effect>) {
        if text.trim().is_empty() {
            return;
        }
        self.silence_side_playback(fx);
        let rate = rate.clamp(MIN_SPEECH_RATE, MAX_SPEECH_RATE);
        let fallback = self
            .recognition
            .word_audio_fallback(&text)
            .map(|url| (url, rate));

        let id = self.next_playback();
        self.side_playback = Some(SidePlayback {
            id,
            is_clip: false,
            fallback,
        });
        fx.push(Effect::PlayAudio {
            id,
            source: AudioSource::Speech {
                text,
                voice: self.recognition.voice_name.clone(),
                language: self.recognition.voice_language.clone(),
            },
            rate,
        });
    }

    fn play_sentence(&mut self, id: &SentenceId, fx: &mut Vec<Effect>) {
        if matches!(self.phase, LessonPhase::PlayingReference | LessonPhase::Recording) {
            log::debug!("lesson: sentence replay ignored in {:?}", self.phase);
            return;
        }
        let Some(url) = self.lesson.find(id).and_then(|s| s.audio_url.clone()) else {
            log::debug!("lesson: sentence {id} has no audio to replay");
            return;
        };
        self.silence_side_playback(fx);
        let playback = self.next_playback();
        self.side_playback = Some(SidePlayback {
            id: playback,
            is_clip: true,
            fallback: None,
        });
        fx.push(Effect::PlayAudio {
            id: playback,
            source: AudioSource::Url(url),
            rate: self.playback.playback_rate,
        });
    }

    fn silence_side_playback(&mut self, fx: &mut Vec<Effect>) {
        if self.side_playback.take().is_some() {
            fx.push(Effect::PauseAudio);
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    fn schedule(&mut self, purpose: TimerPurpose, delay: Duration, fx: &mut Vec<Effect>) {
        if let Some((old, _)) = self.timer.take() {
            fx.push(Effect::CancelTimer(old));
        }
        self.next_id += 1;
        let timer = TimerId(self.next_id);
        self.timer = Some((timer, purpose));
        fx.push(Effect::Schedule { timer, delay });
    }

    fn on_timer(&mut self, id: TimerId, fx: &mut Vec<Effect>) {
        let purpose = match self.timer {
            Some((active, purpose)) if active == id => purpose,
            _ => {
                log::debug!("lesson: dropping stale timer {id}");
                return;
            }
        };
        self.timer = None;
        if self.state.should_stop {
            return;
        }

        match purpose {
            TimerPurpose::NoAudio => {
                if self.phase == LessonPhase::PlayingReference {
                    self.reference_finished(fx);
                }
            }
            TimerPurpose::NextSentence => self.play_current(fx),
            TimerPurpose::LoopRestart => {
                if self.playback.loop_enabled {
                    self.start_pass(fx);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn scroll_to(&self, id: &SentenceId, fx: &mut Vec<Effect>) {
        if self.playback.auto_scroll {
            fx.push(Effect::ScrollTo(id.clone()));
        }
    }

    fn next_playback(&mut self) -> PlaybackId {
        self.next_id += 1;
        PlaybackId(self.next_id)
    }

    fn next_session(&mut self) -> SessionId {
        self.next_id += 1;
        SessionId(self.next_id)
    }
}

fn clamp_rate(rate: f32, min: f32, max: f32) -> Option<f32> {
    rate.is_finite().then(|| rate.clamp(min, max))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::EvaluationLevel;

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn lesson(audio: &[bool]) -> Arc<Lesson> {
        let texts = ["I like cats", "The sun is hot", "We go home"];
        let sentences = audio
            .iter()
            .enumerate()
            .map(|(i, has_audio)| {
                let url = format!("https://cdn.example/{}.mp3", i + 1);
                Sentence::new(
                    (i + 1).to_string(),
                    texts[i % texts.len()],
                    has_audio.then_some(url.as_str()),
                )
            })
            .collect();
        Arc::new(Lesson::from_sentences(sentences).unwrap())
    }

    fn machine_with(lesson: Arc<Lesson>, playback: PlaybackConfig) -> LessonMachine {
        let mut m = LessonMachine::new(
            lesson,
            playback,
            RecognitionConfig::default(),
            ScoringConfig::default(),
            true,
        );
        m.handle(PlatformEvent::PermissionChanged(PermissionState::Granted));
        m
    }

    fn machine(audio: &[bool]) -> LessonMachine {
        machine_with(lesson(audio), PlaybackConfig::default())
    }

    fn played(fx: &[Effect]) -> Option<PlaybackId> {
        fx.iter().find_map(|e| match e {
            Effect::PlayAudio { id, .. } => Some(*id),
            _ => None,
        })
    }

    fn scheduled(fx: &[Effect]) -> Option<TimerId> {
        fx.iter().find_map(|e| match e {
            Effect::Schedule { timer, .. } => Some(*timer),
            _ => None,
        })
    }

    fn scheduled_delay(fx: &[Effect]) -> Option<Duration> {
        fx.iter().find_map(|e| match e {
            Effect::Schedule { delay, .. } => Some(*delay),
            _ => None,
        })
    }

    fn session(fx: &[Effect]) -> Option<SessionId> {
        fx.iter().find_map(|e| match e {
            Effect::StartRecognition { session, .. } => Some(*session),
            _ => None,
        })
    }

    /// Start and let the first reference clip end.
    fn to_awaiting(m: &mut LessonMachine) {
        let fx = m.handle(LessonCommand::Start);
        let id = played(&fx).expect("first sentence has audio");
        m.handle(PlatformEvent::AudioEnded(id));
        assert_eq!(m.phase(), LessonPhase::AwaitingRecording);
    }

    fn record(m: &mut LessonMachine, transcript: &str, confidence: f32) {
        let fx = m.handle(LessonCommand::StartRecording);
        let s = session(&fx).expect("recognition started");
        m.handle(PlatformEvent::Recognized {
            session: s,
            transcript: transcript.into(),
            confidence,
        });
    }

    // -----------------------------------------------------------------------
    // Start / reference playback
    // -----------------------------------------------------------------------

    #[test]
    fn start_plays_first_sentence() {
        let mut m = machine(&[true, true]);
        let fx = m.handle(LessonCommand::Start);

        assert_eq!(m.phase(), LessonPhase::PlayingReference);
        assert!(m.state().is_reading);
        assert!(!m.state().should_stop);
        assert_eq!(m.state().current_index, 0);
        assert_eq!(m.progress(), 50.0);
        assert!(fx.contains(&Effect::ScrollTo("1".into())));
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::PlayAudio { source: AudioSource::Url(u), rate, .. }
                if u == "https://cdn.example/1.mp3" && *rate == 1.0
        )));
    }

    #[test]
    fn start_on_empty_lesson_is_noop() {
        let mut m = machine_with(Arc::new(Lesson::default()), PlaybackConfig::default());
        assert!(m.handle(LessonCommand::Start).is_empty());
        assert_eq!(m.phase(), LessonPhase::Idle);
    }

    #[test]
    fn audio_end_advances_index_and_prompts() {
        let mut m = machine(&[true, true]);
        let fx = m.handle(LessonCommand::Start);
        let fx2 = m.handle(PlatformEvent::AudioEnded(played(&fx).unwrap()));

        assert_eq!(m.phase(), LessonPhase::AwaitingRecording);
        assert_eq!(m.state().current_index, 1);
        assert!(m.state().is_waiting_for_recording);
        assert!(fx2.contains(&Effect::ScrollTo("1".into())));
    }

    #[test]
    fn audio_failure_still_advances() {
        let mut m = machine(&[true, true]);
        let fx = m.handle(LessonCommand::Start);
        m.handle(PlatformEvent::AudioFailed {
            id: played(&fx).unwrap(),
            reason: "404".into(),
        });
        assert_eq!(m.phase(), LessonPhase::AwaitingRecording);
        assert_eq!(m.state().current_index, 1);
    }

    #[test]
    fn sentence_without_audio_waits_then_prompts() {
        let mut m = machine(&[false]);
        let fx = m.handle(LessonCommand::Start);

        assert!(played(&fx).is_none());
        assert_eq!(m.phase(), LessonPhase::PlayingReference);
        assert_eq!(scheduled_delay(&fx), Some(Duration::from_millis(300)));

        m.handle(PlatformEvent::TimerFired(scheduled(&fx).unwrap()));
        assert_eq!(m.phase(), LessonPhase::AwaitingRecording);
        assert_eq!(m.state().current_index, 1);
    }

    #[test]
    fn progress_tracks_each_sentence() {
        let mut m = machine(&[true, true, true, true]);
        to_awaiting(&mut m);
        assert_eq!(m.progress(), 25.0);

        let fx = m.handle(LessonCommand::Skip);
        m.handle(PlatformEvent::TimerFired(scheduled(&fx).unwrap()));
        assert_eq!(m.progress(), 50.0);
    }

    // -----------------------------------------------------------------------
    // Recording and scoring
    // -----------------------------------------------------------------------

    #[test]
    fn recognized_utterance_is_scored_and_kept() {
        let mut m = machine(&[true, true]);
        to_awaiting(&mut m);
        record(&mut m, "I like cats", 0.2);

        assert_eq!(m.phase(), LessonPhase::ShowingResult);
        let result = m.result().unwrap();
        assert!(result.attempt.success);
        assert_eq!(result.sentence_id, SentenceId::from("1"));
        assert_eq!(result.evaluation.as_ref().unwrap().score, 100);
        assert_eq!(result.words.len(), 3);
        assert_eq!(m.scores().get(&SentenceId::from("1")), Some(&100));
        assert!(!m.state().is_recording);
        assert!(!m.state().is_waiting_for_recording);
    }

    #[test]
    fn one_wrong_word_lands_below_excellent() {
        let mut m = machine(&[true]);
        to_awaiting(&mut m);
        record(&mut m, "I like dogs", 0.9);

        let evaluation = m.result().unwrap().evaluation.clone().unwrap();
        assert!(matches!(
            evaluation.level,
            EvaluationLevel::Good | EvaluationLevel::VeryGood
        ));
        assert!(m.result().unwrap().allows_retry());
    }

    #[test]
    fn recognition_error_shows_diagnostic_without_score() {
        let mut m = machine(&[true]);
        to_awaiting(&mut m);
        let fx = m.handle(LessonCommand::StartRecording);
        m.handle(PlatformEvent::RecognitionFailed {
            session: session(&fx).unwrap(),
            error: RecognitionError::NoSpeech,
        });

        assert_eq!(m.phase(), LessonPhase::ShowingResult);
        let result = m.result().unwrap();
        assert!(!result.attempt.success);
        assert_eq!(result.diagnostic, Some("لم يتم سماع أي صوت. حاول مرة أخرى."));
        assert!(m.scores().is_empty());
    }

    #[test]
    fn revoked_permission_raises_banner() {
        let mut m = machine(&[true]);
        to_awaiting(&mut m);
        let fx = m.handle(LessonCommand::StartRecording);
        m.handle(PlatformEvent::RecognitionFailed {
            session: session(&fx).unwrap(),
            error: RecognitionError::NotAllowed,
        });
        assert_eq!(m.notice(), Some(LessonNotice::PermissionDenied));
        assert_eq!(m.permission(), PermissionState::Denied);
    }

    #[test]
    fn new_recording_aborts_live_session_first() {
        let mut m = machine(&[true]);
        to_awaiting(&mut m);
        let first = m.handle(LessonCommand::StartRecording);
        let second = m.handle(LessonCommand::StartRecording);

        let abort_at = second.iter().position(|e| *e == Effect::AbortRecognition);
        let start_at = second
            .iter()
            .position(|e| matches!(e, Effect::StartRecognition { .. }));
        assert!(abort_at.unwrap() < start_at.unwrap());
        assert_ne!(session(&first), session(&second));

        // the first session's result is stale now
        m.handle(PlatformEvent::Recognized {
            session: session(&first).unwrap(),
            transcript: "I like cats".into(),
            confidence: 1.0,
        });
        assert_eq!(m.phase(), LessonPhase::Recording);
        assert!(m.scores().is_empty());
    }

    #[test]
    fn recording_pauses_word_playback() {
        let mut m = machine(&[true]);
        to_awaiting(&mut m);
        m.handle(LessonCommand::PlayWord("cats".into()));
        let fx = m.handle(LessonCommand::StartRecording);
        assert_eq!(fx.first(), Some(&Effect::PauseAudio));
    }

    // -----------------------------------------------------------------------
    // Permission
    // -----------------------------------------------------------------------

    #[test]
    fn recording_without_permission_requests_it_first() {
        let mut m = LessonMachine::new(
            lesson(&[true]),
            PlaybackConfig::default(),
            RecognitionConfig::default(),
            ScoringConfig::default(),
            true,
        );
        m.handle(PlatformEvent::PermissionChanged(PermissionState::Prompt));
        to_awaiting(&mut m);

        let fx = m.handle(LessonCommand::StartRecording);
        assert_eq!(fx, vec![Effect::RequestPermission]);
        assert_eq!(m.phase(), LessonPhase::AwaitingRecording);

        // a second click while the prompt is open does not re-request
        assert!(m.handle(LessonCommand::StartRecording).is_empty());

        let fx = m.handle(PlatformEvent::PermissionChanged(PermissionState::Granted));
        assert!(session(&fx).is_some());
        assert_eq!(m.phase(), LessonPhase::Recording);
    }

    #[test]
    fn denied_permission_keeps_awaiting_with_banner() {
        let mut m = LessonMachine::new(
            lesson(&[true]),
            PlaybackConfig::default(),
            RecognitionConfig::default(),
            ScoringConfig::default(),
            true,
        );
        to_awaiting(&mut m);
        m.handle(LessonCommand::StartRecording);
        let fx = m.handle(PlatformEvent::PermissionChanged(PermissionState::Denied));

        assert!(fx.is_empty());
        assert_eq!(m.phase(), LessonPhase::AwaitingRecording);
        assert_eq!(m.notice(), Some(LessonNotice::PermissionDenied));

        m.handle(LessonCommand::DismissNotice);
        assert!(m.notice().is_none());
    }

    #[test]
    fn granting_permission_clears_banner() {
        let mut m = machine(&[true]);
        m.handle(PlatformEvent::PermissionChanged(PermissionState::Denied));
        assert_eq!(m.notice(), Some(LessonNotice::PermissionDenied));
        let fx = m.handle(PlatformEvent::PermissionChanged(PermissionState::Granted));
        assert!(m.notice().is_none());
        // no capture was pending, so nothing starts
        assert!(fx.is_empty());
    }

    #[test]
    fn banner_request_does_not_start_recording() {
        let mut m = LessonMachine::new(
            lesson(&[true]),
            PlaybackConfig::default(),
            RecognitionConfig::default(),
            ScoringConfig::default(),
            true,
        );
        to_awaiting(&mut m);
        assert_eq!(
            m.handle(LessonCommand::RequestPermission),
            vec![Effect::RequestPermission]
        );
        let fx = m.handle(PlatformEvent::PermissionChanged(PermissionState::Granted));
        assert!(session(&fx).is_none());
        assert_eq!(m.phase(), LessonPhase::AwaitingRecording);
    }

    #[test]
    fn unsupported_recognition_reads_through_and_warns_once() {
        let mut m = LessonMachine::new(
            lesson(&[true, true]),
            PlaybackConfig::default(),
            RecognitionConfig::default(),
            ScoringConfig::default(),
            false,
        );
        let fx = m.handle(LessonCommand::Start);
        assert_eq!(m.notice(), Some(LessonNotice::RecognitionUnsupported));
        m.handle(LessonCommand::DismissNotice);

        m.handle(PlatformEvent::AudioEnded(played(&fx).unwrap()));
        assert_eq!(m.phase(), LessonPhase::Advancing);

        assert!(m.handle(LessonCommand::StartRecording).is_empty());
        assert!(m.notice().is_none(), "notice is raised only once");
    }

    // -----------------------------------------------------------------------
    // Continue / retry / skip
    // -----------------------------------------------------------------------

    #[test]
    fn continue_schedules_next_sentence() {
        let mut m = machine(&[true, true]);
        to_awaiting(&mut m);
        record(&mut m, "I like dogs", 0.9);

        let fx = m.handle(LessonCommand::Continue);
        assert_eq!(m.phase(), LessonPhase::Advancing);
        assert!(m.result().is_none());
        assert_eq!(scheduled_delay(&fx), Some(Duration::from_millis(1_000)));

        let fx = m.handle(PlatformEvent::TimerFired(scheduled(&fx).unwrap()));
        assert_eq!(m.phase(), LessonPhase::PlayingReference);
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::PlayAudio { source: AudioSource::Url(u), .. } if u.ends_with("/2.mp3")
        )));
        // score from the first sentence survives the move
        assert!(m.scores().contains_key(&SentenceId::from("1")));
    }

    #[test]
    fn retry_reopens_same_sentence() {
        let mut m = machine(&[true, true]);
        to_awaiting(&mut m);
        record(&mut m, "I like dogs", 0.9);

        let fx = m.handle(LessonCommand::Retry);
        assert!(session(&fx).is_some());
        assert_eq!(m.phase(), LessonPhase::Recording);
        assert!(m.result().is_none(), "prior attempt discarded");
        assert_eq!(m.state().current_index, 1);

        let s = session(&fx).unwrap();
        m.handle(PlatformEvent::Recognized {
            session: s,
            transcript: "I like cats".into(),
            confidence: 0.5,
        });
        assert_eq!(m.scores().get(&SentenceId::from("1")), Some(&100));
    }

    #[test]
    fn retry_refused_after_excellent() {
        let mut m = machine(&[true]);
        to_awaiting(&mut m);
        record(&mut m, "I like cats", 1.0);

        assert!(m.handle(LessonCommand::Retry).is_empty());
        assert_eq!(m.phase(), LessonPhase::ShowingResult);
    }

    #[test]
    fn retry_allowed_after_failed_attempt() {
        let mut m = machine(&[true]);
        to_awaiting(&mut m);
        let fx = m.handle(LessonCommand::StartRecording);
        m.handle(PlatformEvent::RecognitionFailed {
            session: session(&fx).unwrap(),
            error: RecognitionError::AudioCapture,
        });
        assert!(session(&m.handle(LessonCommand::Retry)).is_some());
    }

    #[test]
    fn skip_records_no_score() {
        let mut m = machine(&[true, true]);
        to_awaiting(&mut m);
        let fx = m.handle(LessonCommand::Skip);
        assert_eq!(m.phase(), LessonPhase::Advancing);
        assert!(m.scores().is_empty());
        m.handle(PlatformEvent::TimerFired(scheduled(&fx).unwrap()));
        assert_eq!(m.phase(), LessonPhase::PlayingReference);
        assert_eq!(m.state().current_index, 1);
    }

    #[test]
    fn skip_while_recording_aborts_session() {
        let mut m = machine(&[true, true]);
        to_awaiting(&mut m);
        m.handle(LessonCommand::StartRecording);
        let fx = m.handle(LessonCommand::Skip);
        assert!(fx.contains(&Effect::AbortRecognition));
        assert!(!m.state().is_recording);
    }

    // -----------------------------------------------------------------------
    // End of pass / loop
    // -----------------------------------------------------------------------

    #[test]
    fn finishing_without_loop_settles_at_100() {
        let mut m = machine(&[true]);
        to_awaiting(&mut m);
        let fx = m.handle(LessonCommand::Skip);
        let fx = m.handle(PlatformEvent::TimerFired(scheduled(&fx).unwrap()));

        assert_eq!(m.phase(), LessonPhase::Finished);
        assert_eq!(m.progress(), 100.0);
        assert!(!m.state().is_reading);
        assert!(scheduled(&fx).is_none());
        assert!(!m.has_pending_work());
    }

    #[test]
    fn loop_restarts_after_delay() {
        let playback = PlaybackConfig {
            loop_enabled: true,
            ..PlaybackConfig::default()
        };
        let mut m = machine_with(lesson(&[true]), playback);
        to_awaiting(&mut m);
        let fx = m.handle(LessonCommand::Skip);
        let fx = m.handle(PlatformEvent::TimerFired(scheduled(&fx).unwrap()));

        assert_eq!(m.phase(), LessonPhase::Finished);
        assert_eq!(scheduled_delay(&fx), Some(Duration::from_millis(400)));

        let fx = m.handle(PlatformEvent::TimerFired(scheduled(&fx).unwrap()));
        assert_eq!(m.phase(), LessonPhase::PlayingReference);
        assert_eq!(m.state().current_index, 0);
        assert!(played(&fx).is_some());
    }

    #[test]
    fn disabling_loop_cancels_pending_restart() {
        let playback = PlaybackConfig {
            loop_enabled: true,
            ..PlaybackConfig::default()
        };
        let mut m = machine_with(lesson(&[true]), playback);
        to_awaiting(&mut m);
        let fx = m.handle(LessonCommand::Skip);
        let fx = m.handle(PlatformEvent::TimerFired(scheduled(&fx).unwrap()));
        let restart = scheduled(&fx).unwrap();

        assert_eq!(
            m.handle(LessonCommand::SetLoop(false)),
            vec![Effect::CancelTimer(restart)]
        );
        assert!(m.handle(PlatformEvent::TimerFired(restart)).is_empty());
        assert_eq!(m.phase(), LessonPhase::Finished);
    }

    // -----------------------------------------------------------------------
    // Pronunciation disabled
    // -----------------------------------------------------------------------

    #[test]
    fn practice_off_reads_straight_through() {
        let playback = PlaybackConfig {
            pronunciation_enabled: false,
            ..PlaybackConfig::default()
        };
        let mut m = machine_with(lesson(&[true, true]), playback);
        let fx = m.handle(LessonCommand::Start);
        let fx = m.handle(PlatformEvent::AudioEnded(played(&fx).unwrap()));

        assert_eq!(m.phase(), LessonPhase::Advancing);
        assert_eq!(scheduled_delay(&fx), Some(Duration::from_millis(500)));

        let fx = m.handle(PlatformEvent::TimerFired(scheduled(&fx).unwrap()));
        assert_eq!(m.state().current_index, 1);
        assert_eq!(m.phase(), LessonPhase::PlayingReference);
        assert!(played(&fx).is_some());
    }

    // -----------------------------------------------------------------------
    // Stop and stale callbacks
    // -----------------------------------------------------------------------

    #[test]
    fn stop_releases_everything_and_resets() {
        let mut m = machine(&[true, true]);
        to_awaiting(&mut m);
        m.handle(LessonCommand::StartRecording);

        let fx = m.handle(LessonCommand::Stop);
        assert!(fx.contains(&Effect::AbortRecognition));
        assert_eq!(m.phase(), LessonPhase::Idle);
        assert_eq!(m.state().current_index, 0);
        assert!(m.state().should_stop);
        assert!(!m.state().is_reading);
        assert!(!m.state().is_recording);
        assert_eq!(m.progress(), 0.0);
        assert!(!m.has_pending_work());
    }

    #[test]
    fn stop_from_every_phase_resets_index() {
        let cases: Vec<Box<dyn Fn(&mut LessonMachine)>> = vec![
            Box::new(|_m: &mut LessonMachine| {}),
            Box::new(|m: &mut LessonMachine| {
                m.handle(LessonCommand::Start);
            }),
            Box::new(|m: &mut LessonMachine| to_awaiting(m)),
            Box::new(|m: &mut LessonMachine| {
                to_awaiting(m);
                m.handle(LessonCommand::StartRecording);
            }),
            Box::new(|m: &mut LessonMachine| {
                to_awaiting(m);
                record(m, "I like dogs", 0.9);
            }),
            Box::new(|m: &mut LessonMachine| {
                to_awaiting(m);
                m.handle(LessonCommand::Skip);
            }),
        ];
        for setup in cases {
            let mut m = machine(&[true, true]);
            setup(&mut m);
            m.handle(LessonCommand::Stop);
            assert_eq!(m.state().current_index, 0);
            assert_eq!(m.phase(), LessonPhase::Idle);
            assert!(!m.has_pending_work());
        }
    }

    #[test]
    fn stop_cancels_pending_timer() {
        let mut m = machine(&[true, true]);
        to_awaiting(&mut m);
        let timer = scheduled(&m.handle(LessonCommand::Skip)).unwrap();

        let fx = m.handle(LessonCommand::Stop);
        assert!(fx.contains(&Effect::CancelTimer(timer)));

        // a timer that raced the cancel is ignored
        assert!(m.handle(PlatformEvent::TimerFired(timer)).is_empty());
        assert_eq!(m.phase(), LessonPhase::Idle);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut m = machine(&[true]);
        m.handle(LessonCommand::Start);
        assert!(!m.handle(LessonCommand::Stop).is_empty());
        assert!(m.handle(LessonCommand::Stop).is_empty());
        assert!(m.handle(LessonCommand::Stop).is_empty());
        assert_eq!(m.phase(), LessonPhase::Idle);
    }

    #[test]
    fn audio_end_after_stop_is_ignored() {
        let mut m = machine(&[true, true]);
        let fx = m.handle(LessonCommand::Start);
        let id = played(&fx).unwrap();
        m.handle(LessonCommand::Stop);

        assert!(m.handle(PlatformEvent::AudioEnded(id)).is_empty());
        assert_eq!(m.phase(), LessonPhase::Idle);
        assert_eq!(m.state().current_index, 0);
    }

    #[test]
    fn recognition_after_stop_is_ignored() {
        let mut m = machine(&[true]);
        to_awaiting(&mut m);
        let s = session(&m.handle(LessonCommand::StartRecording)).unwrap();
        m.handle(LessonCommand::Stop);

        m.handle(PlatformEvent::Recognized {
            session: s,
            transcript: "I like cats".into(),
            confidence: 1.0,
        });
        assert!(m.scores().is_empty());
        assert_eq!(m.phase(), LessonPhase::Idle);
    }

    #[test]
    fn restart_after_stop_begins_fresh_pass() {
        let mut m = machine(&[true, true]);
        to_awaiting(&mut m);
        m.handle(LessonCommand::Stop);
        let fx = m.handle(LessonCommand::Start);
        assert!(!m.state().should_stop);
        assert_eq!(m.state().current_index, 0);
        assert!(played(&fx).is_some());
    }

    #[test]
    fn toggle_play_pause() {
        let mut m = machine(&[true]);
        m.handle(LessonCommand::TogglePlayPause);
        assert!(m.state().is_reading);
        m.handle(LessonCommand::TogglePlayPause);
        assert_eq!(m.phase(), LessonPhase::Idle);
    }

    // -----------------------------------------------------------------------
    // Mixed audio scenario
    // -----------------------------------------------------------------------

    #[test]
    fn every_sentence_gets_a_recording_opportunity() {
        let mut m = machine(&[true, false, true]);
        let mut prompted = Vec::new();

        let mut fx = m.handle(LessonCommand::Start);
        loop {
            // reference phase: audio or the no-audio timer
            let prompt = match (played(&fx), scheduled(&fx)) {
                (Some(id), _) => m.handle(PlatformEvent::AudioEnded(id)),
                (None, Some(t)) => m.handle(PlatformEvent::TimerFired(t)),
                _ => panic!("stalled in {:?}", m.phase()),
            };
            assert!(played(&prompt).is_none());
            assert_eq!(m.phase(), LessonPhase::AwaitingRecording);
            prompted.push(m.state().current_index);

            let skip = m.handle(LessonCommand::Skip);
            fx = m.handle(PlatformEvent::TimerFired(scheduled(&skip).unwrap()));
            if m.phase() == LessonPhase::Finished {
                break;
            }
        }

        assert_eq!(prompted, vec![1, 2, 3]);
        assert_eq!(m.progress(), 100.0);
    }

    // -----------------------------------------------------------------------
    // Word / sentence playback
    // -----------------------------------------------------------------------

    #[test]
    fn play_word_speaks_cleaned_word() {
        let mut m = machine(&[true]);
        let fx = m.handle(LessonCommand::PlayWord("cats.".into()));
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::PlayAudio { source: AudioSource::Speech { text, language, .. }, .. }
                if text == "cats" && language == "en-GB"
        )));
        assert!(m.handle(LessonCommand::PlayWord("?!".into())).is_empty());
    }

    #[test]
    fn play_word_keeps_apostrophes_and_hyphens() {
        let mut m = machine(&[true]);
        for (clicked, spoken) in [("don't", "don't"), ("(well-known)", "well-known")] {
            let fx = m.handle(LessonCommand::PlayWord(clicked.into()));
            assert!(
                fx.iter().any(|e| matches!(
                    e,
                    Effect::PlayAudio { source: AudioSource::Speech { text, .. }, .. } if text == spoken
                )),
                "{clicked} should be spoken as {spoken}"
            );
        }
    }

    #[test]
    fn failed_word_synthesis_falls_back_to_recorded_clip() {
        let mut m = machine(&[true]);
        let word = played(&m.handle(LessonCommand::PlayWord("Apple,".into()))).unwrap();

        let fx = m.handle(PlatformEvent::AudioFailed {
            id: word,
            reason: "no voices".into(),
        });
        let clip = played(&fx).expect("fallback clip");
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::PlayAudio { source: AudioSource::Url(u), .. }
                if u == "https://cdn13674550.b-cdn.net/SNA-audio/words/apple.mp3"
        )));

        // the fallback clip failing too ends the attempt
        assert!(m
            .handle(PlatformEvent::AudioFailed {
                id: clip,
                reason: "404".into(),
            })
            .is_empty());
        assert!(!m.has_pending_work());
    }

    #[test]
    fn word_that_played_needs_no_fallback() {
        let mut m = machine(&[true]);
        let word = played(&m.handle(LessonCommand::PlayWord("apple".into()))).unwrap();
        assert!(m.handle(PlatformEvent::AudioEnded(word)).is_empty());
    }

    #[test]
    fn play_word_during_reference_counts_as_heard() {
        let mut m = machine(&[true, true]);
        let first = played(&m.handle(LessonCommand::Start)).unwrap();
        let fx = m.handle(LessonCommand::PlayWord("sun".into()));

        assert_eq!(fx.first(), Some(&Effect::PauseAudio));
        assert_eq!(m.phase(), LessonPhase::AwaitingRecording);
        assert_eq!(m.state().current_index, 1);

        // the interrupted clip's late end changes nothing
        m.handle(PlatformEvent::AudioEnded(first));
        assert_eq!(m.state().current_index, 1);
    }

    #[test]
    fn word_end_does_not_move_the_lesson() {
        let mut m = machine(&[true, true]);
        to_awaiting(&mut m);
        let word = played(&m.handle(LessonCommand::PlayWord("like".into()))).unwrap();
        assert!(m.handle(PlatformEvent::AudioEnded(word)).is_empty());
        assert_eq!(m.phase(), LessonPhase::AwaitingRecording);
    }

    #[test]
    fn play_word_ignored_while_recording() {
        let mut m = machine(&[true]);
        to_awaiting(&mut m);
        m.handle(LessonCommand::StartRecording);
        assert!(m.handle(LessonCommand::PlayWord("cats".into())).is_empty());
    }

    #[test]
    fn replay_sentence_when_idle() {
        let mut m = machine(&[true, false]);
        let fx = m.handle(LessonCommand::PlaySentence("1".into()));
        assert!(played(&fx).is_some());
        assert_eq!(m.phase(), LessonPhase::Idle);

        assert!(m.handle(LessonCommand::PlaySentence("2".into())).is_empty());
        assert!(m.handle(LessonCommand::PlaySentence("9".into())).is_empty());
    }

    fn spoken(fx: &[Effect]) -> Option<(String, f32)> {
        fx.iter().find_map(|e| match e {
            Effect::PlayAudio {
                source: AudioSource::Speech { text, .. },
                rate,
                ..
            } => Some((text.clone(), *rate)),
            _ => None,
        })
    }

    #[test]
    fn listen_reads_practised_sentence_at_both_speeds() {
        let mut m = machine(&[true, true]);
        to_awaiting(&mut m);

        let normal = m.handle(LessonCommand::ListenPractised { slow: false });
        assert_eq!(spoken(&normal), Some(("I like cats".to_string(), 1.0)));

        // the slow reading replaces the normal one
        let slow = m.handle(LessonCommand::ListenPractised { slow: true });
        assert_eq!(slow.first(), Some(&Effect::PauseAudio));
        assert_eq!(spoken(&slow), Some(("I like cats".to_string(), 0.75)));
        assert_eq!(m.phase(), LessonPhase::AwaitingRecording);
    }

    #[test]
    fn listen_covers_sentence_without_audio() {
        let mut m = machine(&[true, false]);
        to_awaiting(&mut m);
        let fx = m.handle(LessonCommand::Skip);
        let fx = m.handle(PlatformEvent::TimerFired(scheduled(&fx).unwrap()));
        m.handle(PlatformEvent::TimerFired(scheduled(&fx).unwrap()));
        assert_eq!(m.phase(), LessonPhase::AwaitingRecording);

        let fx = m.handle(LessonCommand::ListenPractised { slow: true });
        assert_eq!(spoken(&fx), Some(("The sun is hot".to_string(), 0.75)));
    }

    #[test]
    fn listen_offered_on_result_but_not_while_reading() {
        let mut m = machine(&[true]);
        assert!(m.handle(LessonCommand::ListenPractised { slow: false }).is_empty());
        m.handle(LessonCommand::Start);
        assert!(m.handle(LessonCommand::ListenPractised { slow: false }).is_empty());

        let mut m = machine(&[true]);
        to_awaiting(&mut m);
        record(&mut m, "I like dogs", 0.9);
        let fx = m.handle(LessonCommand::ListenPractised { slow: false });
        assert_eq!(spoken(&fx), Some(("I like cats".to_string(), 1.0)));

        // a new recording silences the model reading
        let fx = m.handle(LessonCommand::Retry);
        assert_eq!(fx.first(), Some(&Effect::PauseAudio));
    }

    #[test]
    fn rate_change_retunes_live_reference() {
        let mut m = machine(&[true, true]);
        m.handle(LessonCommand::Start);
        assert_eq!(
            m.handle(LessonCommand::SetPlaybackRate(1.5)),
            vec![Effect::SetRate(1.5)]
        );
        assert_eq!(
            m.handle(LessonCommand::SetPlaybackRate(9.0)),
            vec![Effect::SetRate(2.0)]
        );
    }

    #[test]
    fn rate_change_without_a_clip_is_stored_only() {
        let mut m = machine(&[true]);
        assert!(m.handle(LessonCommand::SetPlaybackRate(0.75)).is_empty());

        // synthesized speech keeps the rate it started with
        to_awaiting(&mut m);
        m.handle(LessonCommand::ListenPractised { slow: false });
        assert!(m.handle(LessonCommand::SetPlaybackRate(1.25)).is_empty());

        // a replayed recording follows the new rate
        let mut m = machine(&[true]);
        m.handle(LessonCommand::PlaySentence("1".into()));
        assert_eq!(
            m.handle(LessonCommand::SetPlaybackRate(1.25)),
            vec![Effect::SetRate(1.25)]
        );
    }

    #[test]
    fn replay_ignored_during_reference() {
        let mut m = machine(&[true, true]);
        m.handle(LessonCommand::Start);
        assert!(m.handle(LessonCommand::PlaySentence("2".into())).is_empty());
    }

    #[test]
    fn playback_rate_is_clamped() {
        let mut m = machine(&[true]);
        m.handle(LessonCommand::SetPlaybackRate(5.0));
        let fx = m.handle(LessonCommand::Start);
        assert!(fx
            .iter()
            .any(|e| matches!(e, Effect::PlayAudio { rate, .. } if *rate == 2.0)));

        m.handle(LessonCommand::SetPlaybackRate(f32::NAN));
        let mut view = LessonView::default();
        m.publish(&mut view);
        assert_eq!(view.playback_rate, 2.0);
    }

    #[test]
    fn no_scroll_when_auto_scroll_disabled() {
        let playback = PlaybackConfig {
            auto_scroll: false,
            ..PlaybackConfig::default()
        };
        let mut m = machine_with(lesson(&[true]), playback);
        let fx = m.handle(LessonCommand::Start);
        assert!(!fx.iter().any(|e| matches!(e, Effect::ScrollTo(_))));
    }

    #[test]
    fn stop_clears_scroll_target() {
        let mut m = machine(&[true, true]);
        m.handle(LessonCommand::Start);
        let mut view = LessonView {
            scroll_target: Some("1".into()),
            ..LessonView::default()
        };
        m.publish(&mut view);
        assert_eq!(view.scroll_target, Some(SentenceId::from("1")));

        m.handle(LessonCommand::Stop);
        m.publish(&mut view);
        assert!(view.scroll_target.is_none());
    }

    #[test]
    fn publish_copies_state() {
        let mut m = machine(&[true, true]);
        to_awaiting(&mut m);
        record(&mut m, "I like cats", 1.0);

        let mut view = LessonView::default();
        m.publish(&mut view);
        assert_eq!(view.phase, LessonPhase::ShowingResult);
        assert_eq!(view.playback.current_index, 1);
        assert_eq!(view.scores.get(&SentenceId::from("1")), Some(&100));
        assert!(view.result.is_some());
        assert_eq!(view.permission, PermissionState::Granted);
        assert!(view.recognition_supported);
    }
}
