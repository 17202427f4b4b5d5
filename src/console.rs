//! Terminal host
//!
//! Runs the coordinator without audio hardware: typed lines stand in for
//! the microphone and utterances are printed instead of played. Useful for
//! exercising turn-taking and echo suppression by hand.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::speech::{
    RecognitionEngine, RecognitionEvents, RecognitionOptions, SpeakOptions, SpeechCoordinator,
    SynthesisEngine, TranscriptEvent, Utterance, UtteranceEvents, Voice,
};
use crate::transcript_log::{HttpTranscriptSink, TranscriptSink};
use crate::{Error, Result};

/// First thing the kiosk says
pub const WELCOME: &str = "안녕하세요! 느린 키오스크입니다. 원하시는 메뉴를 말씀해주세요.";

/// Simulated playback time per character
const PLAYBACK_PER_CHAR: Duration = Duration::from_millis(60);

/// Shortest simulated playback
const MIN_PLAYBACK: Duration = Duration::from_millis(400);

/// Recognizer fed by typed lines
///
/// A line only counts as heard while a session is running, like a
/// microphone that is muted between sessions.
#[derive(Default)]
pub struct LineRecognizer {
    session: Mutex<Option<RecognitionEvents>>,
}

impl LineRecognizer {
    /// Deliver a typed line as one interim then one final result
    ///
    /// Returns `false` if no session is listening.
    pub fn hear(&self, line: &str) -> bool {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let Some(events) = session else {
            return false;
        };
        events.result(line, "");
        events.result("", line);
        true
    }

    /// Whether a session is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl RecognitionEngine for LineRecognizer {
    fn start(&self, options: &RecognitionOptions, events: RecognitionEvents) -> Result<()> {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.is_some() {
            return Err(Error::Recognition("recognizer already running".to_string()));
        }
        tracing::trace!(session = events.session(), lang = %options.lang, "line recognizer started");
        *session = Some(events);
        Ok(())
    }

    fn stop(&self) {
        let events = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(events) = events {
            events.ended();
        }
    }
}

struct Playback {
    events: UtteranceEvents,
    timer: JoinHandle<()>,
}

/// Synthesizer that prints utterances and finishes after a
/// length-proportional delay
#[derive(Default)]
pub struct ConsoleSynthesizer {
    playback: Mutex<Option<Playback>>,
    last_spoken: Mutex<Option<String>>,
}

impl ConsoleSynthesizer {
    /// Text of the most recent utterance
    #[must_use]
    pub fn last_spoken(&self) -> Option<String> {
        self.last_spoken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn playback_time(text: &str) -> Duration {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        PLAYBACK_PER_CHAR.saturating_mul(chars).max(MIN_PLAYBACK)
    }
}

impl SynthesisEngine for ConsoleSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        vec![Voice {
            name: "console".to_string(),
            lang: "ko-KR".to_string(),
            default: true,
        }]
    }

    fn speak(&self, utterance: &Utterance, events: UtteranceEvents) -> Result<()> {
        println!("kiosk> {}", utterance.text);

        *self
            .last_spoken
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(utterance.text.clone());

        let done = events.clone();
        let delay = Self::playback_time(&utterance.text);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            done.finished();
        });

        let previous = self
            .playback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Playback { events, timer });
        if let Some(previous) = previous {
            previous.timer.abort();
        }
        Ok(())
    }

    fn cancel(&self) {
        let playback = self
            .playback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(playback) = playback {
            playback.timer.abort();
            playback.events.failed("canceled");
        }
    }
}

/// What the session loop reacts to besides typed lines
enum HostEvent {
    Heard(String),
    Injected(String),
}

/// Run an interactive console session until `/quit` or end of input
///
/// # Errors
///
/// Returns error if the transcript log is misconfigured or stdin fails
pub async fn run_session(config: Config) -> Result<()> {
    let recognizer = Arc::new(LineRecognizer::default());
    let synthesizer = Arc::new(ConsoleSynthesizer::default());
    let coordinator = SpeechCoordinator::new(
        &config,
        Arc::clone(&recognizer) as Arc<dyn RecognitionEngine>,
        Arc::clone(&synthesizer) as Arc<dyn SynthesisEngine>,
    );

    if let Some(sink) = HttpTranscriptSink::from_config(&config.transcript_log)? {
        tracing::info!(url = sink.url(), "forwarding transcripts");
        coordinator.enable_transcript_log(Some(Arc::new(sink) as Arc<dyn TranscriptSink>));
    }

    let (tx, mut rx) = mpsc::unbounded_channel();

    let heard = tx.clone();
    coordinator.on_result(move |event| match event {
        TranscriptEvent::Interim(text) => println!("  ... {text}"),
        TranscriptEvent::Final(text) => {
            let _ = heard.send(HostEvent::Heard(text.clone()));
        }
    });
    coordinator.on_error(|error| println!("  [mic error: {error}]"));

    let injected = tx;
    coordinator.set_test_voice_input_handler(move |text| {
        let _ = injected.send(HostEvent::Injected(text.to_string()));
    });

    println!("Type to speak. !text injects, /echo replays the kiosk, /stop, /quit.");
    coordinator.speak(WELCOME, SpeakOptions::new());
    let listener = coordinator.clone();
    tokio::spawn(async move { listener.start(true).await });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                match line {
                    "" => {}
                    "/quit" => break,
                    "/stop" => coordinator.stop_speaking(),
                    "/echo" => match synthesizer.last_spoken() {
                        Some(text) => {
                            if !recognizer.hear(&text) {
                                println!("  [microphone paused]");
                            }
                        }
                        None => println!("  [nothing spoken yet]"),
                    },
                    _ => {
                        if let Some(text) = line.strip_prefix('!') {
                            coordinator.inject_test_voice_input(text.trim());
                        } else if !recognizer.hear(line) {
                            println!("  [microphone paused]");
                        }
                    }
                }
            }
            Some(event) = rx.recv() => match event {
                HostEvent::Heard(text) => {
                    println!("you> {text}");
                    coordinator.speak(format!("{text}, 알겠습니다."), SpeakOptions::new());
                }
                HostEvent::Injected(text) => {
                    println!("test> {text}");
                    coordinator.speak(format!("{text}, 알겠습니다."), SpeakOptions::new());
                }
            },
        }
    }

    coordinator.clear_test_voice_input_handler();
    coordinator.stop_speaking();
    coordinator.stop();
    Ok(())
}
