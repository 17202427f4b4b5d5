//! Speech output controller pieces
//!
//! Utterance lifecycle, caller options, and the completion plumbing that
//! guarantees every `speak` resolves exactly once: played, interrupted by a
//! later `speak`/`stop_speaking`, or failed.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;

use super::engine::{SynthesisEngine, Utterance, UtteranceId, Voice};

/// Default bound on waiting for the engine's voice list (10 × 100 ms)
pub const DEFAULT_VOICE_READY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Engine codes that mean "stopped on purpose", not a failure
const INTERRUPTION_CODES: &[&str] = &["canceled", "interrupted"];

/// Lifecycle of one utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceLifecycle {
    /// Accepted, waiting for voices
    Queued,
    /// Handed to the engine
    Speaking,
    /// Played to the end
    Ended,
    /// Superseded or stopped
    Canceled,
    /// Engine failure
    Errored,
}

/// How an utterance left the output controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Played to the end
    Completed,
    /// Canceled by a later `speak`, `stop_speaking`, or an engine interruption
    Interrupted,
    /// Engine failure with its code
    Failed(String),
}

impl SpeechOutcome {
    /// Map an engine failure code onto an outcome
    #[must_use]
    pub fn from_engine_code(code: &str) -> Self {
        if INTERRUPTION_CODES.contains(&code) {
            Self::Interrupted
        } else {
            Self::Failed(code.to_string())
        }
    }

    pub(crate) const fn lifecycle(&self) -> UtteranceLifecycle {
        match self {
            Self::Completed => UtteranceLifecycle::Ended,
            Self::Interrupted => UtteranceLifecycle::Canceled,
            Self::Failed(_) => UtteranceLifecycle::Errored,
        }
    }
}

type EndCallback = Box<dyn FnOnce() + Send>;
type ErrorCallback = Box<dyn FnOnce(&str) + Send>;

/// Per-call speech options
#[derive(Default)]
pub struct SpeakOptions {
    pub(crate) rate: Option<f32>,
    pub(crate) pitch: Option<f32>,
    pub(crate) volume: Option<f32>,
    on_end: Option<EndCallback>,
    on_error: Option<ErrorCallback>,
}

impl SpeakOptions {
    /// Options using the configured defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Speaking rate multiplier
    #[must_use]
    pub const fn rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Pitch multiplier
    #[must_use]
    pub const fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = Some(pitch);
        self
    }

    /// Volume (0.0 to 1.0)
    #[must_use]
    pub const fn volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Called exactly once when the utterance leaves the controller, however it ends
    #[must_use]
    pub fn on_end<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_end = Some(Box::new(f));
        self
    }

    /// Called with the engine code when synthesis genuinely fails
    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&str) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    pub(crate) fn into_completion(self) -> (Completion, SpeechHandle, SpeechParams) {
        let (tx, rx) = oneshot::channel();
        let params = SpeechParams {
            rate: self.rate,
            pitch: self.pitch,
            volume: self.volume,
        };
        let completion = Completion {
            on_end: self.on_end,
            on_error: self.on_error,
            tx: Some(tx),
        };
        (completion, SpeechHandle { rx }, params)
    }
}

/// Voice parameters requested by the caller
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpeechParams {
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,
}

/// Caller notifications for one utterance; consumed on completion
///
/// Dropped unconsumed, it resolves as [`SpeechOutcome::Interrupted`] so
/// `on_end` still fires exactly once.
pub(crate) struct Completion {
    on_end: Option<EndCallback>,
    on_error: Option<ErrorCallback>,
    tx: Option<oneshot::Sender<SpeechOutcome>>,
}

impl Completion {
    /// Notify the caller. Runs outside any coordinator lock.
    pub(crate) fn complete(mut self, outcome: SpeechOutcome) {
        self.notify(outcome);
    }

    fn notify(&mut self, outcome: SpeechOutcome) {
        if let (SpeechOutcome::Failed(code), Some(on_error)) = (&outcome, self.on_error.take()) {
            on_error(code);
        }
        if let Some(on_end) = self.on_end.take() {
            on_end();
        }
        if let Some(tx) = self.tx.take() {
            // Receiver may have been dropped; the callbacks already ran
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::debug!("utterance dropped before completing");
            self.notify(SpeechOutcome::Interrupted);
        }
    }
}

/// Awaitable completion of one `speak` call
///
/// Resolves exactly once with the utterance's [`SpeechOutcome`]. Dropping
/// the handle does not cancel the utterance.
#[derive(Debug)]
pub struct SpeechHandle {
    rx: oneshot::Receiver<SpeechOutcome>,
}

impl Future for SpeechHandle {
    type Output = SpeechOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(SpeechOutcome::Interrupted))
    }
}

/// The single utterance owned by the output controller
pub(crate) struct ActiveUtterance {
    pub utterance: Utterance,
    pub normalized: String,
    pub lifecycle: UtteranceLifecycle,
    pub completion: Completion,
}

impl ActiveUtterance {
    pub(crate) const fn id(&self) -> UtteranceId {
        self.utterance.id
    }
}

/// Wait for the engine to publish voices, bounded by `timeout`
///
/// Returns an empty list on timeout; the utterance then uses the engine
/// default voice instead of blocking.
pub(crate) async fn wait_for_voices(engine: &dyn SynthesisEngine, timeout: Duration) -> Vec<Voice> {
    let ready = async {
        loop {
            let voices = engine.voices();
            if !voices.is_empty() {
                return voices;
            }
            engine.voices_changed().await;
        }
    };

    if let Ok(voices) = tokio::time::timeout(timeout, ready).await {
        voices
    } else {
        tracing::warn!(
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "voice list still empty, using engine default voice"
        );
        Vec::new()
    }
}

/// Pick the best voice for `lang`
///
/// Exact language match first, then same primary language, then the
/// engine's default voice.
pub(crate) fn pick_voice(voices: &[Voice], lang: &str) -> Option<Voice> {
    let primary = |tag: &str| tag.split(['-', '_']).next().unwrap_or("").to_lowercase();
    let wanted = primary(lang);

    voices
        .iter()
        .find(|v| v.lang.eq_ignore_ascii_case(lang))
        .or_else(|| voices.iter().find(|v| primary(&v.lang) == wanted))
        .or_else(|| voices.iter().find(|v| v.default))
        .cloned()
}
