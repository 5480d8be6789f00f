//! Application entry point: terminal pronunciation practice.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Parse the command line and load [`AppConfig`] (defaults on first run).
//! 3. Resolve and load the lesson JSON.
//! 4. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 5. Spawn the [`LessonOrchestrator`] with console adapters.
//! 6. Spawn the view printer.
//! 7. Read stdin until `:quit` or EOF; typed lines stand in for speech.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use lesson_coach::{
    config::{AppConfig, AppPaths},
    lesson::{Lesson, SentenceId},
    pipeline::{
        new_shared_state, LessonCommand, LessonNotice, LessonOrchestrator, LessonPhase,
        RecordingResult, SharedState,
    },
    platform::{
        AudioError, AudioPlayer, AudioSource, EventSink, MicrophoneAccess, PermissionState,
        PlatformEvent, PlaybackId, RecognitionError, SessionId, SpeechRecognizer,
    },
};

/// Simulated length of a reference clip at rate 1.0.
const CLIP_DURATION: Duration = Duration::from_millis(1_500);
/// Simulated length of a spoken word.
const WORD_DURATION: Duration = Duration::from_millis(500);
/// Confidence reported for typed transcripts.
const TYPED_CONFIDENCE: f32 = 0.9;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "lesson-coach", about = "Listen, repeat, and get scored sentence by sentence")]
struct Cli {
    /// Lesson JSON file, or the name of a lesson in the lessons directory.
    lesson: String,

    /// Restart the lesson when the last sentence is done.
    #[arg(long = "loop")]
    loop_enabled: bool,

    /// Read the lesson without recording prompts.
    #[arg(long)]
    no_practice: bool,

    /// Reference playback rate, 0.5 to 2.0.
    #[arg(long)]
    rate: Option<f32>,

    /// Settings file to use instead of the platform default.
    #[arg(long)]
    config: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Console adapters
// ---------------------------------------------------------------------------

/// Pretends to play audio: prints what would play and reports the end after
/// a simulated clip length.
#[derive(Default)]
struct ConsoleAudio {
    current: Mutex<Option<ConsoleClip>>,
}

struct ConsoleClip {
    id: PlaybackId,
    sink: EventSink,
    handle: JoinHandle<()>,
    started: Instant,
    remaining: Duration,
    rate: f32,
}

impl ConsoleAudio {
    fn spawn_end(
        runtime: &tokio::runtime::Handle,
        id: PlaybackId,
        sink: EventSink,
        after: Duration,
    ) -> JoinHandle<()> {
        runtime.spawn(async move {
            tokio::time::sleep(after).await;
            let _ = sink.send(PlatformEvent::AudioEnded(id));
        })
    }
}

impl AudioPlayer for ConsoleAudio {
    fn play(
        &self,
        id: PlaybackId,
        source: &AudioSource,
        rate: f32,
        sink: EventSink,
    ) -> Result<(), AudioError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AudioError::Unavailable(e.to_string()))?;

        let length = match source {
            AudioSource::Url(url) => {
                println!("  ♪ {url} (x{rate:.2})");
                CLIP_DURATION.div_f32(rate.max(0.1))
            }
            AudioSource::Speech { text, voice, .. } => {
                println!("  ♪ \"{text}\" ({voice}, x{rate:.2})");
                WORD_DURATION
            }
        };

        let handle = Self::spawn_end(&runtime, id, sink.clone(), length);
        let clip = ConsoleClip {
            id,
            sink,
            handle,
            started: Instant::now(),
            remaining: length,
            rate,
        };
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.replace(clip) {
            previous.handle.abort();
        }
        Ok(())
    }

    fn pause(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(clip) = current.take() {
            clip.handle.abort();
        }
    }

    fn set_rate(&self, rate: f32) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(clip) = current.as_mut() else {
            return;
        };
        if clip.handle.is_finished() {
            return;
        }
        // Stretch what is left of the clip to the new speed.
        let left = clip.remaining.saturating_sub(clip.started.elapsed());
        let left = left.mul_f32(clip.rate / rate.max(0.1));
        clip.handle.abort();
        clip.handle = Self::spawn_end(&runtime, clip.id, clip.sink.clone(), left);
        clip.started = Instant::now();
        clip.remaining = left;
        clip.rate = rate;
        println!("  ♪ speed x{rate:.2}");
    }
}

/// The next typed line becomes the live session's transcript.
#[derive(Default)]
struct ConsoleRecognizer {
    active: Mutex<Option<(SessionId, EventSink)>>,
}

impl ConsoleRecognizer {
    /// Deliver `line` to the live session.  Returns `false` when nothing is
    /// listening.
    fn answer(&self, line: &str) -> bool {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some((session, sink)) = active else {
            return false;
        };
        let event = if line.trim().is_empty() {
            PlatformEvent::RecognitionFailed {
                session,
                error: RecognitionError::NoSpeech,
            }
        } else {
            PlatformEvent::Recognized {
                session,
                transcript: line.trim().to_string(),
                confidence: TYPED_CONFIDENCE,
            }
        };
        let _ = sink.send(event);
        true
    }
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn is_supported(&self) -> bool {
        true
    }

    fn start(
        &self,
        session: SessionId,
        _language: &str,
        sink: EventSink,
    ) -> Result<(), RecognitionError> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some((session, sink));
        Ok(())
    }

    fn abort(&self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// A terminal has no microphone gate.
struct ConsoleMicrophone;

#[async_trait]
impl MicrophoneAccess for ConsoleMicrophone {
    async fn query(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn request(&self) -> PermissionState {
        PermissionState::Granted
    }
}

// ---------------------------------------------------------------------------
// View printer
// ---------------------------------------------------------------------------

async fn print_view(state: SharedState, lesson: Arc<Lesson>) {
    let mut last_phase = None;
    let mut last_result: Option<RecordingResult> = None;
    let mut last_notice: Option<LessonNotice> = None;

    loop {
        let view = state.lock().unwrap_or_else(PoisonError::into_inner).clone();

        if view.notice != last_notice {
            if let Some(notice) = view.notice {
                println!("! {notice}");
            }
            last_notice = view.notice;
        }

        if last_phase != Some(view.phase) {
            last_phase = Some(view.phase);
            match view.phase {
                LessonPhase::PlayingReference => {
                    if let Some(sentence) = view.active_sentence.as_ref().and_then(|id| lesson.find(id)) {
                        println!("\n[{:>3.0}%] {}", view.progress, sentence.text);
                    }
                }
                LessonPhase::AwaitingRecording => {
                    println!(
                        "  {} (Enter to record, :listen or :slow to hear it, :skip to move on)",
                        view.phase.label()
                    );
                }
                LessonPhase::Recording => println!("  {}... type what you said", view.phase.label()),
                LessonPhase::Finished => print_summary(&view.scores, &lesson),
                LessonPhase::Idle if view.playback.should_stop => println!("  stopped"),
                _ => {}
            }
        }

        if view.result != last_result {
            if let Some(result) = &view.result {
                print_result(result);
            }
            last_result = view.result;
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn print_result(result: &RecordingResult) {
    match &result.evaluation {
        Some(evaluation) => {
            println!("  {}% {} ({})", evaluation.score, evaluation.message, evaluation.level.as_str());
            let words: Vec<String> = result
                .words
                .iter()
                .map(|w| if w.correct { w.word.clone() } else { format!("*{}*", w.word) })
                .collect();
            println!("  {}", words.join(" "));
        }
        None => {
            if let Some(diagnostic) = result.diagnostic {
                println!("  {diagnostic}");
            }
        }
    }
    if result.allows_retry() {
        println!("  Enter to continue, :retry to try again");
    } else {
        println!("  Enter to continue");
    }
}

fn print_summary(scores: &std::collections::BTreeMap<SentenceId, u8>, lesson: &Lesson) {
    println!("\nDone.");
    if scores.is_empty() {
        return;
    }
    let total: u32 = scores.values().map(|s| u32::from(*s)).sum();
    println!(
        "Scored {} of {} sentences, average {}%",
        scores.len(),
        lesson.len(),
        total / scores.len() as u32
    );
}

// ---------------------------------------------------------------------------
// Input loop
// ---------------------------------------------------------------------------

/// Map one stdin line to an orchestrator command.  `None` means quit.
fn parse_command(
    line: &str,
    phase: LessonPhase,
    lesson: &Lesson,
    recognizer: &ConsoleRecognizer,
) -> Option<Option<LessonCommand>> {
    let Some(rest) = line.strip_prefix(':') else {
        let command = match phase {
            LessonPhase::Recording => {
                recognizer.answer(line);
                None
            }
            LessonPhase::AwaitingRecording => Some(LessonCommand::StartRecording),
            LessonPhase::ShowingResult => Some(LessonCommand::Continue),
            LessonPhase::Idle | LessonPhase::Finished => Some(LessonCommand::Start),
            _ => None,
        };
        return Some(command);
    };

    let (name, arg) = rest
        .trim()
        .split_once(' ')
        .map_or((rest.trim(), ""), |(n, a)| (n, a.trim()));

    let command = match name {
        "q" | "quit" => return None,
        "start" => LessonCommand::Start,
        "stop" => LessonCommand::Stop,
        "p" | "pause" => LessonCommand::TogglePlayPause,
        "skip" => LessonCommand::Skip,
        "retry" => LessonCommand::Retry,
        "continue" => LessonCommand::Continue,
        "allow" => LessonCommand::RequestPermission,
        "dismiss" => LessonCommand::DismissNotice,
        "loop" => LessonCommand::SetLoop(arg != "off"),
        "rate" => match arg.parse() {
            Ok(rate) => LessonCommand::SetPlaybackRate(rate),
            Err(_) => {
                println!("  usage: :rate 0.75");
                return Some(None);
            }
        },
        "replay" => LessonCommand::PlaySentence(SentenceId::new(arg)),
        "listen" => LessonCommand::ListenPractised { slow: false },
        "slow" => LessonCommand::ListenPractised { slow: true },
        "word" => {
            let entry = lesson.lookup_word(arg);
            println!(
                "  {}: {} / {} [{}]",
                entry.word, entry.translation, entry.definition, entry.part_of_speech
            );
            LessonCommand::PlayWord(arg.to_string())
        }
        other => {
            println!("  unknown command :{other}");
            return Some(None);
        }
    };
    Some(Some(command))
}

async fn run(lesson: Lesson, config: AppConfig) -> anyhow::Result<()> {
    let lesson = Arc::new(lesson);
    let state = new_shared_state();
    let recognizer = Arc::new(ConsoleRecognizer::default());

    let (command_tx, command_rx) = mpsc::channel::<LessonCommand>(16);
    let orchestrator = LessonOrchestrator::new(
        Arc::clone(&lesson),
        &config,
        Arc::clone(&state),
        Arc::new(ConsoleAudio::default()),
        recognizer.clone(),
        Arc::new(ConsoleMicrophone),
    );
    let orchestrator = tokio::spawn(orchestrator.run(command_rx));
    let printer = tokio::spawn(print_view(Arc::clone(&state), Arc::clone(&lesson)));

    println!(
        "{}: {} sentences. Enter to start, :word <w> to look up, :quit to leave.",
        lesson.title.as_deref().unwrap_or("Lesson"),
        lesson.len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let phase = state.lock().unwrap_or_else(PoisonError::into_inner).phase;
        match parse_command(&line, phase, &lesson, &recognizer) {
            None => break,
            Some(None) => {}
            Some(Some(command)) => {
                if command_tx.send(command).await.is_err() {
                    log::error!("lesson orchestrator stopped unexpectedly");
                    break;
                }
            }
        }
    }

    drop(command_tx);
    orchestrator.await.context("orchestrator task failed")?;
    printer.abort();
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Command line + configuration
    let cli = Cli::parse();
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    if cli.loop_enabled {
        config.playback.loop_enabled = true;
    }
    if cli.no_practice {
        config.playback.pronunciation_enabled = false;
    }
    if let Some(rate) = cli.rate {
        config.playback.playback_rate = rate;
    }

    // 3. Lesson
    let lesson_path = AppPaths::new().resolve_lesson(&cli.lesson);
    let lesson = Lesson::load_from(&lesson_path)
        .with_context(|| format!("failed to load lesson {}", lesson_path.display()))?;
    log::info!("Loaded {} ({} sentences)", lesson_path.display(), lesson.len());

    // 4. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 5-7. Orchestrator, printer, input loop
    rt.block_on(run(lesson, config))
}
