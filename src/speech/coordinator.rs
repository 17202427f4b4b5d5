//! Turn-taking coordinator
//!
//! The only component that commands the recognition and synthesis engines.
//! It keeps listening and speaking mutually exclusive on the shared audio
//! device: a `speak` pauses recognition, and recognition resumes once the
//! utterance leaves the speaker. Finalized transcripts pass through the
//! debouncer and the echo filter before reaching listeners.
//!
//! All state lives behind one mutex that is never held across an await or
//! while caller callbacks run. Engine callbacks arrive through a channel and
//! are applied in order by a single pump task.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::debounce::Debouncer;
use super::echo::{EchoFilter, normalize};
use super::engine::{
    EngineEvent, RecognitionEngine, RecognitionEvent, SessionId, SynthesisEngine, SynthesisEvent,
    Utterance, UtteranceEvents, UtteranceId, Voice,
};
use super::input::{InputController, RecognitionError, SessionState};
use super::listeners::{ListenerId, ListenerRegistry};
use super::output::{
    ActiveUtterance, Completion, SpeakOptions, SpeechHandle, SpeechOutcome, UtteranceLifecycle,
    pick_voice, wait_for_voices,
};
use super::recent::RecentOutputLog;
use super::test_input::TestInputChannel;
use crate::config::{Config, SpeechConfig};
use crate::transcript_log::{TranscriptRecord, TranscriptSink};

/// Which side of the audio channel is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Neither listening nor speaking
    Idle,
    /// Recognizer running
    InputActive,
    /// An utterance is queued or playing
    OutputActive,
}

/// Transcript update delivered to result listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// Live, undebounced partial text for on-screen display
    Interim(String),
    /// Committed utterance that survived debouncing and echo filtering
    Final(String),
}

impl TranscriptEvent {
    /// Interim text, or empty
    #[must_use]
    pub fn interim(&self) -> &str {
        match self {
            Self::Interim(text) => text,
            Self::Final(_) => "",
        }
    }

    /// Final text, or empty
    #[must_use]
    pub fn final_text(&self) -> &str {
        match self {
            Self::Final(text) => text,
            Self::Interim(_) => "",
        }
    }
}

/// Output side of the audio channel, published for deferred starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputPhase {
    Idle,
    Active,
}

/// Result of a start attempt made after output went idle
enum StartAttempt {
    Done,
    OutputBusy,
}

/// Mutable coordinator state, guarded by one lock
struct CoreState {
    input: InputController,
    debouncer: Debouncer,
    output: Option<ActiveUtterance>,
    recent: RecentOutputLog,
    last_output_end: Option<Instant>,
    next_utterance: UtteranceId,
    start_generation: u64,
}

/// Side effects collected under the lock and run after it is released
#[derive(Default)]
struct Effects {
    transcripts: Vec<TranscriptEvent>,
    errors: Vec<RecognitionError>,
    completions: Vec<(Completion, SpeechOutcome)>,
    committed: Vec<String>,
    output_drained: bool,
}

struct Inner {
    config: SpeechConfig,
    echo: EchoFilter,
    synthesizer: Arc<dyn SynthesisEngine>,
    tx: mpsc::UnboundedSender<EngineEvent>,
    state: Mutex<CoreState>,
    output_phase: watch::Sender<OutputPhase>,
    results: ListenerRegistry<TranscriptEvent>,
    errors: ListenerRegistry<RecognitionError>,
    test_input: TestInputChannel,
    transcript_sink: Mutex<Option<Arc<dyn TranscriptSink>>>,
    pump: OnceLock<JoinHandle<()>>,
}

/// Arbitrates speech input and output on one shared audio device
///
/// Cheap to clone; all clones drive the same engines.
#[derive(Clone)]
pub struct SpeechCoordinator {
    inner: Arc<Inner>,
}

impl SpeechCoordinator {
    /// Create a coordinator owning both engines
    ///
    /// Must be called within a tokio runtime: the engine event pump and the
    /// debounce timers are spawned tasks.
    #[must_use]
    pub fn new(
        config: &Config,
        recognizer: Arc<dyn RecognitionEngine>,
        synthesizer: Arc<dyn SynthesisEngine>,
    ) -> Self {
        let echo = &config.echo;
        let config = config.speech.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let (output_phase, _) = watch::channel(OutputPhase::Idle);

        let state = CoreState {
            input: InputController::new(
                recognizer,
                config.lang.clone(),
                config.interim_results,
                tx.clone(),
            ),
            debouncer: Debouncer::new(config.debounce),
            output: None,
            recent: RecentOutputLog::with_capacity(echo.history_capacity),
            last_output_end: None,
            next_utterance: 1,
            start_generation: 0,
        };

        let inner = Arc::new(Inner {
            echo: EchoFilter::from_config(echo),
            config,
            synthesizer,
            tx,
            state: Mutex::new(state),
            output_phase,
            results: ListenerRegistry::default(),
            errors: ListenerRegistry::default(),
            test_input: TestInputChannel::default(),
            transcript_sink: Mutex::new(None),
            pump: OnceLock::new(),
        });

        let pump = tokio::spawn(run_event_pump(Arc::downgrade(&inner), rx));
        let _ = inner.pump.set(pump);

        Self { inner }
    }

    /// Start listening
    ///
    /// Idempotent while already listening. Errors (unsupported engine,
    /// denied permission) are reported to error listeners, never returned.
    /// If speech output is active, waits for it to finish first; a later
    /// `start` or `stop` supersedes a waiting call.
    pub async fn start(&self, continuous: bool) {
        let generation = {
            let mut state = self.inner.lock();
            if let Err(error) = state.input.check_startable() {
                drop(state);
                tracing::warn!(code = %error.code, "recognition start rejected");
                self.inner.errors.emit(&error);
                return;
            }
            state.start_generation += 1;
            state.start_generation
        };

        let mut phase = self.inner.output_phase.subscribe();
        loop {
            if *phase.borrow_and_update() == OutputPhase::Active {
                tracing::debug!("speech output active, deferring recognition start");
                if phase.wait_for(|p| *p == OutputPhase::Idle).await.is_err() {
                    return;
                }
            }

            match self.inner.try_start(continuous, generation) {
                StartAttempt::Done => return,
                StartAttempt::OutputBusy => continue,
            }
        }
    }

    /// Stop listening; safe in any state
    ///
    /// Discards any buffered final fragment and its timer.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        state.start_generation += 1;
        state.debouncer.cancel();
        state.input.stop();
    }

    /// Whether the recognizer is running
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.inner.lock().input.is_listening()
    }

    /// Recognition session state
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.inner.lock().input.state()
    }

    /// Latest interim or final text, independent of debouncing
    #[must_use]
    pub fn current_transcript(&self) -> String {
        self.inner.lock().input.current_transcript().to_string()
    }

    /// Which side of the audio channel is active
    #[must_use]
    pub fn turn_state(&self) -> TurnState {
        let state = self.inner.lock();
        if state.output.is_some() {
            TurnState::OutputActive
        } else if state.input.is_listening() {
            TurnState::InputActive
        } else {
            TurnState::Idle
        }
    }

    /// Whether an utterance is queued or playing
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.inner.lock().output.is_some()
    }

    /// Whether both engines exist on this host
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.inner.lock().input.is_available() && self.inner.synthesizer.is_available()
    }

    /// Whether microphone permission has been denied
    #[must_use]
    pub fn permission_denied(&self) -> bool {
        self.inner.lock().input.state() == SessionState::PermissionDenied
    }

    /// Clear a permission denial so `start` may try again
    pub fn reset_permission(&self) -> bool {
        self.inner.lock().input.reset_permission()
    }

    /// Subscribe to transcript events
    pub fn on_result<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TranscriptEvent) + Send + Sync + 'static,
    {
        self.inner.results.subscribe(listener)
    }

    /// Subscribe to surfaced recognition errors
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&RecognitionError) + Send + Sync + 'static,
    {
        self.inner.errors.subscribe(listener)
    }

    /// Remove a result or error listener
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.results.unsubscribe(id) || self.inner.errors.unsubscribe(id)
    }

    /// Speak `text`, superseding any utterance in progress
    ///
    /// Pauses recognition for the duration. The returned handle, and the
    /// `on_end` callback, resolve exactly once however the utterance ends.
    pub fn speak(&self, text: impl Into<String>, options: SpeakOptions) -> SpeechHandle {
        let text = text.into();
        let (completion, handle, params) = options.into_completion();

        if !self.inner.synthesizer.is_available() {
            tracing::error!(text = %text, "speech synthesis unsupported");
            completion.complete(SpeechOutcome::Failed("synthesis-unsupported".to_string()));
            return handle;
        }

        if text.trim().is_empty() {
            tracing::debug!("empty utterance skipped");
            completion.complete(SpeechOutcome::Completed);
            return handle;
        }

        let mut effects = Effects::default();
        let id = {
            let mut state = self.inner.lock();
            let id = state.next_utterance;
            state.next_utterance += 1;

            if let Some(previous) = state.output.take() {
                tracing::debug!(utterance = previous.id(), "superseded by new utterance");
                self.inner.retire(
                    &mut state,
                    previous,
                    SpeechOutcome::Interrupted,
                    true,
                    &mut effects,
                );
            }

            if state.input.pause() {
                state.debouncer.cancel();
            }

            let config = &self.inner.config;
            let utterance = Utterance {
                id,
                text,
                lang: config.lang.clone(),
                voice: None,
                rate: params.rate.unwrap_or(config.rate),
                pitch: params.pitch.unwrap_or(config.pitch),
                volume: params.volume.unwrap_or(config.volume),
            };
            state.output = Some(ActiveUtterance {
                normalized: normalize(&utterance.text),
                utterance,
                lifecycle: UtteranceLifecycle::Queued,
                completion,
            });
            self.inner.output_phase.send_replace(OutputPhase::Active);
            id
        };
        self.inner.dispatch(effects);

        let weak = Arc::downgrade(&self.inner);
        let synthesizer = Arc::clone(&self.inner.synthesizer);
        let timeout = self.inner.config.voice_ready_timeout;
        tokio::spawn(async move {
            let voices = wait_for_voices(synthesizer.as_ref(), timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.begin_speaking(id, &voices);
            }
        });

        handle
    }

    /// Stop speaking; safe in any state
    ///
    /// The interrupted utterance still completes with
    /// [`SpeechOutcome::Interrupted`], and recognition resumes if it was
    /// paused for it.
    pub fn stop_speaking(&self) {
        let mut effects = Effects::default();
        {
            let mut state = self.inner.lock();
            if let Some(active) = state.output.take() {
                tracing::debug!(utterance = active.id(), "speech stopped");
                self.inner.retire(
                    &mut state,
                    active,
                    SpeechOutcome::Interrupted,
                    true,
                    &mut effects,
                );
                Inner::settle_output(&state, &mut effects);
            }
        }
        self.inner.dispatch(effects);
    }

    /// Install the handler that receives injected test voice input
    pub fn set_test_voice_input_handler<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.test_input.set_handler(handler);
    }

    /// Remove the test voice input handler
    pub fn clear_test_voice_input_handler(&self) {
        self.inner.test_input.clear_handler();
    }

    /// Feed literal text to the test handler, bypassing recognition,
    /// debouncing and echo filtering
    ///
    /// Returns `false` if no handler is installed.
    pub fn inject_test_voice_input(&self, text: &str) -> bool {
        self.inner.test_input.inject(text)
    }

    /// Send copies of committed transcripts to `sink`, or stop with `None`
    pub fn enable_transcript_log(&self, sink: Option<Arc<dyn TranscriptSink>>) {
        tracing::info!(enabled = sink.is_some(), "transcript log toggled");
        *self
            .inner
            .transcript_sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = sink;
    }

    /// Speech configuration in use
    #[must_use]
    pub fn config(&self) -> &SpeechConfig {
        &self.inner.config
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_start(&self, continuous: bool, generation: u64) -> StartAttempt {
        let mut effects = Effects::default();
        let attempt = {
            let mut state = self.lock();
            if state.start_generation != generation {
                tracing::debug!("deferred recognition start superseded");
                StartAttempt::Done
            } else if state.output.is_some() {
                StartAttempt::OutputBusy
            } else {
                if !state.input.is_listening() {
                    state.debouncer.cancel();
                }
                if let Err(error) = state.input.begin(continuous) {
                    tracing::warn!(code = %error.code, "recognition start rejected");
                    effects.errors.push(error);
                }
                StartAttempt::Done
            }
        };
        self.dispatch(effects);
        attempt
    }

    /// Hand a queued utterance to the engine once voices are known
    fn begin_speaking(&self, id: UtteranceId, voices: &[Voice]) {
        let mut effects = Effects::default();
        {
            let mut state = self.lock();
            let state = &mut *state;
            let Some(active) = state.output.as_mut().filter(|a| a.id() == id) else {
                tracing::trace!(utterance = id, "utterance gone before voices were ready");
                return;
            };

            active.utterance.voice = pick_voice(voices, &active.utterance.lang);
            let events = UtteranceEvents::new(id, self.tx.clone());

            match self.synthesizer.speak(&active.utterance, events) {
                Ok(()) => {
                    active.lifecycle = UtteranceLifecycle::Speaking;
                    state.recent.record(active.normalized.clone(), Instant::now());
                    tracing::info!(
                        utterance = id,
                        text = %active.utterance.text,
                        voice = active.utterance.voice.as_ref().map(|v| v.name.as_str()),
                        "speaking"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        utterance = id,
                        text = %active.utterance.text,
                        error = %e,
                        "speech synthesis failed to start"
                    );
                    if let Some(active) = state.output.take() {
                        let outcome = SpeechOutcome::Failed(e.to_string());
                        self.retire(state, active, outcome, false, &mut effects);
                    }
                    Self::settle_output(state, &mut effects);
                }
            }
        }
        self.dispatch(effects);
    }

    /// Take an utterance out of service and queue its completion
    ///
    /// `cancel_engine` stops the synthesizer if the utterance is playing.
    fn retire(
        &self,
        state: &mut CoreState,
        mut active: ActiveUtterance,
        outcome: SpeechOutcome,
        cancel_engine: bool,
        effects: &mut Effects,
    ) {
        if active.lifecycle == UtteranceLifecycle::Speaking {
            if cancel_engine {
                self.synthesizer.cancel();
            }
            state.last_output_end = Some(Instant::now());
        }
        active.lifecycle = outcome.lifecycle();
        tracing::debug!(utterance = active.id(), lifecycle = ?active.lifecycle, "utterance retired");
        effects.completions.push((active.completion, outcome));
    }

    /// Note that the output slot emptied
    ///
    /// Idling is deferred until completions have run, since an `on_end`
    /// may chain the next utterance.
    fn settle_output(state: &CoreState, effects: &mut Effects) {
        if state.output.is_none() {
            effects.output_drained = true;
        }
    }

    /// Output is still empty after completions: publish it and resume
    /// recognition if paused
    fn idle_output(&self) {
        let mut state = self.lock();
        if state.output.is_some() {
            tracing::debug!("output chained from completion, recognition stays paused");
            return;
        }
        self.output_phase.send_replace(OutputPhase::Idle);
        state.input.resume();
    }

    fn handle_event(self: &Arc<Self>, event: EngineEvent) {
        match event {
            EngineEvent::Recognition { session, event } => self.handle_recognition(session, event),
            EngineEvent::Synthesis { utterance, event } => self.handle_synthesis(utterance, event),
        }
    }

    fn handle_recognition(self: &Arc<Self>, session: SessionId, event: RecognitionEvent) {
        let mut effects = Effects::default();
        {
            let mut state = self.lock();
            if !state.input.accepts(session) {
                tracing::trace!(session, ?event, "event from inactive recognition session dropped");
                return;
            }

            match event {
                RecognitionEvent::Result { interim, final_text } => {
                    state.input.record_transcript(&interim, &final_text);

                    if !interim.is_empty() {
                        state.debouncer.cancel();
                        effects.transcripts.push(TranscriptEvent::Interim(interim));
                    }

                    if !final_text.trim().is_empty() {
                        let weak = Arc::downgrade(self);
                        let seq = state.debouncer.push_final(final_text, move |seq| {
                            if let Some(inner) = weak.upgrade() {
                                inner.commit_final(seq);
                            }
                        });
                        tracing::debug!(seq, "final fragment buffered");
                    }
                }
                RecognitionEvent::Error(code) => {
                    if let Some(error) = state.input.on_error(code) {
                        effects.errors.push(error);
                    }
                    if state.input.state() == SessionState::PermissionDenied {
                        state.debouncer.cancel();
                    }
                }
                RecognitionEvent::Ended => state.input.on_ended(),
            }
        }
        self.dispatch(effects);
    }

    fn handle_synthesis(&self, id: UtteranceId, event: SynthesisEvent) {
        let mut effects = Effects::default();
        {
            let mut state = self.lock();
            let state = &mut *state;
            let Some(active) = state.output.take_if(|a| a.id() == id) else {
                tracing::trace!(utterance = id, ?event, "event for retired utterance dropped");
                return;
            };

            let outcome = match event {
                SynthesisEvent::Finished => SpeechOutcome::Completed,
                SynthesisEvent::Failed(code) => {
                    let outcome = SpeechOutcome::from_engine_code(&code);
                    if matches!(outcome, SpeechOutcome::Interrupted) {
                        tracing::debug!(utterance = id, code = %code, "speech interrupted");
                    } else {
                        tracing::error!(
                            utterance = id,
                            text = %active.utterance.text,
                            code = %code,
                            "speech synthesis error"
                        );
                    }
                    outcome
                }
            };

            self.retire(state, active, outcome, false, &mut effects);
            Self::settle_output(state, &mut effects);
        }
        self.dispatch(effects);
    }

    /// Debounce timer fired: filter and deliver the buffered final text
    fn commit_final(&self, seq: u64) {
        let mut effects = Effects::default();
        {
            let mut state = self.lock();
            let Some(text) = state.debouncer.take(seq) else {
                return;
            };
            let text = text.trim().to_string();

            let verdict = self.echo.check(
                &text,
                Instant::now(),
                state.last_output_end,
                &state.recent,
            );

            if verdict.is_suppressed() {
                tracing::info!(text = %text, ?verdict, "echo suppressed");
            } else {
                tracing::info!(text = %text, "transcript committed");
                effects.committed.push(text.clone());
                effects.transcripts.push(TranscriptEvent::Final(text));
            }
        }
        self.dispatch(effects);
    }

    /// Run collected side effects with no lock held
    fn dispatch(&self, effects: Effects) {
        for error in &effects.errors {
            self.errors.emit(error);
        }
        for (completion, outcome) in effects.completions {
            completion.complete(outcome);
        }
        if effects.output_drained {
            self.idle_output();
        }
        for event in &effects.transcripts {
            self.results.emit(event);
        }
        if !effects.committed.is_empty() {
            self.forward_to_log(effects.committed);
        }
    }

    /// Fire-and-forget copies of committed transcripts
    fn forward_to_log(&self, texts: Vec<String>) {
        let sink = self
            .transcript_sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(sink) = sink else {
            return;
        };

        for text in texts {
            let record = TranscriptRecord::new(text, &self.config.lang);
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                if let Err(e) = sink.send(&record).await {
                    tracing::warn!(error = %e, text = %record.text, "failed to forward transcript");
                }
            });
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get() {
            pump.abort();
        }

        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.input.stop();
        state.debouncer.cancel();
        if let Some(active) = state.output.take() {
            if active.lifecycle == UtteranceLifecycle::Speaking {
                self.synthesizer.cancel();
            }
            tracing::debug!(utterance = active.id(), "coordinator dropped while speaking");
            active.completion.complete(SpeechOutcome::Interrupted);
        }
    }
}

/// Apply engine events in arrival order
async fn run_event_pump(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<EngineEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_event(event);
    }
    tracing::trace!("engine event pump stopped");
}
