//! Recognition and synthesis engine seams
//!
//! The coordinator never performs speech-to-text or text-to-speech itself.
//! Hosts plug in engines (a browser bridge, a cloud API, a console stub)
//! through these traits. Engines report back only through the event sinks
//! they are handed; every sink is scoped to one recognition session or one
//! utterance so late callbacks from superseded work can be told apart.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

/// Identifier of one recognition session (one engine `start`)
pub type SessionId = u64;

/// Identifier of one synthesized utterance
pub type UtteranceId = u64;

/// Raw event emitted by a recognition engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Transcript update; either half may be empty
    Result {
        /// Tentative text, subject to revision
        interim: String,
        /// Text the engine declared complete
        final_text: String,
    },
    /// Engine error code, passed through unmodified (e.g. `not-allowed`)
    Error(String),
    /// The session ended, explicitly or as a natural lifecycle event
    Ended,
}

/// Raw event emitted by a synthesis engine for one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    /// The utterance played to the end
    Finished,
    /// The utterance stopped with an engine code (e.g. `interrupted`)
    Failed(String),
}

/// Event envelope routed to the coordinator's event pump
#[derive(Debug)]
pub(crate) enum EngineEvent {
    Recognition {
        session: SessionId,
        event: RecognitionEvent,
    },
    Synthesis {
        utterance: UtteranceId,
        event: SynthesisEvent,
    },
}

/// Event sink handed to a recognition engine for one session
#[derive(Debug, Clone)]
pub struct RecognitionEvents {
    session: SessionId,
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl RecognitionEvents {
    pub(crate) const fn new(session: SessionId, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { session, tx }
    }

    /// Session this sink belongs to
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Report a transcript update
    pub fn result(&self, interim: impl Into<String>, final_text: impl Into<String>) {
        self.emit(RecognitionEvent::Result {
            interim: interim.into(),
            final_text: final_text.into(),
        });
    }

    /// Report an engine error code
    pub fn error(&self, code: impl Into<String>) {
        self.emit(RecognitionEvent::Error(code.into()));
    }

    /// Report the end of the session
    pub fn ended(&self) {
        self.emit(RecognitionEvent::Ended);
    }

    /// Send a raw event
    pub fn emit(&self, event: RecognitionEvent) {
        let envelope = EngineEvent::Recognition {
            session: self.session,
            event,
        };
        if self.tx.send(envelope).is_err() {
            tracing::trace!(session = self.session, "coordinator gone, recognition event dropped");
        }
    }
}

/// Event sink handed to a synthesis engine for one utterance
#[derive(Debug, Clone)]
pub struct UtteranceEvents {
    utterance: UtteranceId,
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl UtteranceEvents {
    pub(crate) const fn new(utterance: UtteranceId, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { utterance, tx }
    }

    /// Utterance this sink belongs to
    #[must_use]
    pub const fn utterance(&self) -> UtteranceId {
        self.utterance
    }

    /// Report that the utterance played to the end
    pub fn finished(&self) {
        self.emit(SynthesisEvent::Finished);
    }

    /// Report that the utterance stopped with an engine code
    pub fn failed(&self, code: impl Into<String>) {
        self.emit(SynthesisEvent::Failed(code.into()));
    }

    /// Send a raw event
    pub fn emit(&self, event: SynthesisEvent) {
        let envelope = EngineEvent::Synthesis {
            utterance: self.utterance,
            event,
        };
        if self.tx.send(envelope).is_err() {
            tracing::trace!(utterance = self.utterance, "coordinator gone, synthesis event dropped");
        }
    }
}

/// Options passed to a recognition engine on start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// BCP-47 language tag (e.g. "ko-KR")
    pub lang: String,
    /// Keep listening across pauses instead of stopping after one phrase
    pub continuous: bool,
    /// Emit interim (tentative) results
    pub interim_results: bool,
}

/// A synthesis voice offered by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Engine-specific voice name
    pub name: String,
    /// BCP-47 language tag
    pub lang: String,
    /// Whether the engine marks this voice as its default
    pub default: bool,
}

/// One utterance handed to a synthesis engine
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Coordinator-assigned identifier
    pub id: UtteranceId,
    /// Text to speak
    pub text: String,
    /// BCP-47 language tag
    pub lang: String,
    /// Selected voice; `None` means the engine default
    pub voice: Option<Voice>,
    /// Speaking rate multiplier
    pub rate: f32,
    /// Pitch multiplier
    pub pitch: f32,
    /// Volume (0.0 to 1.0)
    pub volume: f32,
}

/// Continuous speech recognition capability
///
/// Implementations must be non-blocking and must never call back into the
/// coordinator synchronously; everything goes through the session's
/// [`RecognitionEvents`]. Exactly one `ended()` must be reported for every
/// successful `start`, whether the session was stopped or ended on its own.
pub trait RecognitionEngine: Send + Sync {
    /// Whether recognition exists at all on this host
    fn is_available(&self) -> bool {
        true
    }

    /// Begin a recognition session
    ///
    /// # Errors
    ///
    /// Returns error if the engine refuses to start (e.g. already running)
    fn start(&self, options: &RecognitionOptions, events: RecognitionEvents) -> Result<()>;

    /// Stop the current session, if any
    fn stop(&self);
}

/// Speech synthesis capability
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Whether synthesis exists at all on this host
    fn is_available(&self) -> bool {
        true
    }

    /// Currently loaded voices; may be empty while the engine warms up
    fn voices(&self) -> Vec<Voice>;

    /// Resolves when the voice list may have changed
    ///
    /// The default never resolves, so callers fall back to their timeout.
    async fn voices_changed(&self) {
        std::future::pending::<()>().await;
    }

    /// Start speaking an utterance, cancelling nothing
    ///
    /// # Errors
    ///
    /// Returns error if the utterance could not be queued
    fn speak(&self, utterance: &Utterance, events: UtteranceEvents) -> Result<()>;

    /// Cancel whatever is being spoken
    fn cancel(&self);
}
