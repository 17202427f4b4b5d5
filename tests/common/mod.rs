//! Shared test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use kiosk_speech::speech::{
    RecognitionEngine, RecognitionEvents, RecognitionOptions, SynthesisEngine, Utterance,
    UtteranceEvents, Voice,
};
use kiosk_speech::{Config, Error, Result, SpeechCoordinator, TranscriptEvent};

/// Let spawned tasks and the engine event pump run without advancing time
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Korean voice offered by default
pub fn korean_voice() -> Voice {
    Voice {
        name: "Yuna".to_string(),
        lang: "ko-KR".to_string(),
        default: false,
    }
}

/// English voice marked as engine default
pub fn english_voice() -> Voice {
    Voice {
        name: "Samantha".to_string(),
        lang: "en-US".to_string(),
        default: true,
    }
}

#[derive(Default)]
struct RecognizerState {
    unavailable: bool,
    fail_start: bool,
    starts: usize,
    stops: usize,
    session: Option<RecognitionEvents>,
    last_options: Option<RecognitionOptions>,
}

/// Recognition engine driven by the test
///
/// Emits exactly one `ended` per successful start, on `stop` or
/// [`MockRecognizer::end_naturally`].
#[derive(Default)]
pub struct MockRecognizer {
    state: Mutex<RecognizerState>,
}

impl MockRecognizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn unavailable() -> Arc<Self> {
        let recognizer = Self::default();
        recognizer.state.lock().unwrap().unavailable = true;
        Arc::new(recognizer)
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }

    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().session.is_some()
    }

    pub fn last_options(&self) -> Option<RecognitionOptions> {
        self.state.lock().unwrap().last_options.clone()
    }

    /// Sink of the running session, kept to simulate late callbacks
    pub fn session(&self) -> Option<RecognitionEvents> {
        self.state.lock().unwrap().session.clone()
    }

    fn running(&self) -> RecognitionEvents {
        self.session().expect("recognizer is not running")
    }

    pub fn interim(&self, text: &str) {
        self.running().result(text, "");
    }

    pub fn final_result(&self, text: &str) {
        self.running().result("", text);
    }

    pub fn error(&self, code: &str) {
        self.running().error(code);
    }

    /// End the session the way engines do after silence
    pub fn end_naturally(&self) {
        let session = self.state.lock().unwrap().session.take();
        if let Some(events) = session {
            events.ended();
        }
    }
}

impl RecognitionEngine for MockRecognizer {
    fn is_available(&self) -> bool {
        !self.state.lock().unwrap().unavailable
    }

    fn start(&self, options: &RecognitionOptions, events: RecognitionEvents) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_start {
            return Err(Error::Recognition("microphone busy".to_string()));
        }
        if state.session.is_some() {
            return Err(Error::Recognition("already started".to_string()));
        }
        state.starts += 1;
        state.last_options = Some(options.clone());
        state.session = Some(events);
        Ok(())
    }

    fn stop(&self) {
        let session = {
            let mut state = self.state.lock().unwrap();
            state.stops += 1;
            state.session.take()
        };
        if let Some(events) = session {
            events.ended();
        }
    }
}

struct SynthesizerState {
    unavailable: bool,
    fail_speak: bool,
    voices: Vec<Voice>,
    spoken: Vec<Utterance>,
    current: Option<UtteranceEvents>,
    cancels: usize,
}

/// Synthesis engine driven by the test
pub struct MockSynthesizer {
    state: Mutex<SynthesizerState>,
    voices_changed: Notify,
}

impl MockSynthesizer {
    fn with_voices(voices: Vec<Voice>) -> Self {
        Self {
            state: Mutex::new(SynthesizerState {
                unavailable: false,
                fail_speak: false,
                voices,
                spoken: Vec::new(),
                current: None,
                cancels: 0,
            }),
            voices_changed: Notify::new(),
        }
    }

    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_voices(vec![korean_voice()]))
    }

    /// Engine still loading its voice list
    pub fn without_voices() -> Arc<Self> {
        Arc::new(Self::with_voices(Vec::new()))
    }

    pub fn offering(voices: Vec<Voice>) -> Arc<Self> {
        Arc::new(Self::with_voices(voices))
    }

    pub fn unavailable() -> Arc<Self> {
        let synthesizer = Self::with_voices(Vec::new());
        synthesizer.state.lock().unwrap().unavailable = true;
        Arc::new(synthesizer)
    }

    pub fn set_fail_speak(&self, fail: bool) {
        self.state.lock().unwrap().fail_speak = fail;
    }

    pub fn publish_voices(&self, voices: Vec<Voice>) {
        self.state.lock().unwrap().voices = voices;
        self.voices_changed.notify_waiters();
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        self.state.lock().unwrap().spoken.clone()
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|u| u.text).collect()
    }

    pub fn cancels(&self) -> usize {
        self.state.lock().unwrap().cancels
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().unwrap().current.is_some()
    }

    /// Sink of the playing utterance, kept to simulate late callbacks
    pub fn current(&self) -> Option<UtteranceEvents> {
        self.state.lock().unwrap().current.clone()
    }

    /// Play the current utterance to the end
    pub fn finish(&self) {
        let current = self.state.lock().unwrap().current.take();
        current.expect("nothing is playing").finished();
    }

    /// Stop the current utterance with an engine code
    pub fn fail(&self, code: &str) {
        let current = self.state.lock().unwrap().current.take();
        current.expect("nothing is playing").failed(code);
    }
}

#[async_trait]
impl SynthesisEngine for MockSynthesizer {
    fn is_available(&self) -> bool {
        !self.state.lock().unwrap().unavailable
    }

    fn voices(&self) -> Vec<Voice> {
        self.state.lock().unwrap().voices.clone()
    }

    async fn voices_changed(&self) {
        self.voices_changed.notified().await;
    }

    fn speak(&self, utterance: &Utterance, events: UtteranceEvents) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_speak {
            return Err(Error::Synthesis("audio output unavailable".to_string()));
        }
        state.spoken.push(utterance.clone());
        state.current = Some(events);
        Ok(())
    }

    fn cancel(&self) {
        let current = {
            let mut state = self.state.lock().unwrap();
            state.cancels += 1;
            state.current.take()
        };
        if let Some(events) = current {
            events.failed("interrupted");
        }
    }
}

/// Coordinator over fresh mocks with default configuration
pub fn setup() -> (SpeechCoordinator, Arc<MockRecognizer>, Arc<MockSynthesizer>) {
    setup_with(&Config::default(), MockRecognizer::new(), MockSynthesizer::new())
}

/// Coordinator over the given engines
pub fn setup_with(
    config: &Config,
    recognizer: Arc<MockRecognizer>,
    synthesizer: Arc<MockSynthesizer>,
) -> (SpeechCoordinator, Arc<MockRecognizer>, Arc<MockSynthesizer>) {
    let coordinator = SpeechCoordinator::new(
        config,
        Arc::clone(&recognizer) as Arc<dyn RecognitionEngine>,
        Arc::clone(&synthesizer) as Arc<dyn SynthesisEngine>,
    );
    (coordinator, recognizer, synthesizer)
}

/// Every transcript event delivered to a listener
#[derive(Clone, Default)]
pub struct Transcripts(Arc<Mutex<Vec<TranscriptEvent>>>);

impl Transcripts {
    pub fn attach(coordinator: &SpeechCoordinator) -> Self {
        let transcripts = Self::default();
        let sink = Arc::clone(&transcripts.0);
        coordinator.on_result(move |event| sink.lock().unwrap().push(event.clone()));
        transcripts
    }

    pub fn finals(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                TranscriptEvent::Final(text) => Some(text.clone()),
                TranscriptEvent::Interim(_) => None,
            })
            .collect()
    }

    pub fn interims(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                TranscriptEvent::Interim(text) => Some(text.clone()),
                TranscriptEvent::Final(_) => None,
            })
            .collect()
    }
}

/// Every error code delivered to a listener
#[derive(Clone, Default)]
pub struct Errors(Arc<Mutex<Vec<String>>>);

impl Errors {
    pub fn attach(coordinator: &SpeechCoordinator) -> Self {
        let errors = Self::default();
        let sink = Arc::clone(&errors.0);
        coordinator.on_error(move |error| sink.lock().unwrap().push(error.code.clone()));
        errors
    }

    pub fn codes(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}
