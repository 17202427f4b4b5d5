//! Speech input controller
//!
//! Owns the recognition engine: continuous-mode auto-restart, pause and
//! resume around speech output, and permission failure tracking. Only the
//! coordinator drives it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::engine::{EngineEvent, RecognitionEngine, RecognitionEvents, RecognitionOptions, SessionId};

/// Engine code for a denied microphone permission
pub const NOT_ALLOWED: &str = "not-allowed";

/// Code reported when no recognition engine exists on the host
pub const ENGINE_UNSUPPORTED: &str = "engine-unsupported";

/// Lifecycle state of the recognition session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not listening
    Idle,
    /// Engine running
    Listening,
    /// Engine stopped while the kiosk speaks; resumes afterwards if asked to
    PausedForOutput,
    /// Microphone permission refused; terminal until reset
    PermissionDenied,
}

/// Category of a recognition error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Microphone access refused; disables auto-restart
    PermissionDenied,
    /// Recognition absent on this host; callers fall back to manual input
    Unsupported,
    /// Expected noise such as silence timeouts; never surfaced
    Transient,
    /// Anything else the engine reports (network, audio capture, ...)
    Other,
}

/// Recognition error as delivered to error listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionError {
    /// Classification
    pub kind: RecognitionErrorKind,
    /// Engine code, unmodified
    pub code: String,
}

impl RecognitionError {
    /// Classify a raw engine code
    #[must_use]
    pub fn from_code(code: impl Into<String>) -> Self {
        let code = code.into();
        let kind = match code.as_str() {
            NOT_ALLOWED | "service-not-allowed" => RecognitionErrorKind::PermissionDenied,
            ENGINE_UNSUPPORTED => RecognitionErrorKind::Unsupported,
            "no-speech" | "aborted" => RecognitionErrorKind::Transient,
            _ => RecognitionErrorKind::Other,
        };
        Self { kind, code }
    }

    /// Error reported when no engine is available
    #[must_use]
    pub fn unsupported() -> Self {
        Self::from_code(ENGINE_UNSUPPORTED)
    }

    /// Error re-reported while permission stays denied
    #[must_use]
    pub fn permission_denied() -> Self {
        Self::from_code(NOT_ALLOWED)
    }

    /// Whether listeners ever see this error
    #[must_use]
    pub const fn is_surfaced(&self) -> bool {
        !matches!(self.kind, RecognitionErrorKind::Transient)
    }
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// Recognition session state plus the engine it commands
pub(crate) struct InputController {
    engine: Arc<dyn RecognitionEngine>,
    options: RecognitionOptions,
    tx: mpsc::UnboundedSender<EngineEvent>,
    state: SessionState,
    continuous_intent: bool,
    current_transcript: String,
    active: Option<SessionId>,
    next_session: SessionId,
}

impl InputController {
    pub(crate) fn new(
        engine: Arc<dyn RecognitionEngine>,
        lang: String,
        interim_results: bool,
        tx: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            engine,
            options: RecognitionOptions {
                lang,
                continuous: true,
                interim_results,
            },
            tx,
            state: SessionState::Idle,
            continuous_intent: false,
            current_transcript: String::new(),
            active: None,
            next_session: 1,
        }
    }

    pub(crate) fn is_available(&self) -> bool {
        self.engine.is_available()
    }

    pub(crate) const fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn is_listening(&self) -> bool {
        self.state == SessionState::Listening
    }

    pub(crate) fn current_transcript(&self) -> &str {
        &self.current_transcript
    }

    /// Whether events from `session` should be processed
    pub(crate) fn accepts(&self, session: SessionId) -> bool {
        self.active == Some(session)
    }

    /// Report why a start request cannot proceed, if it cannot
    pub(crate) fn check_startable(&self) -> Result<(), RecognitionError> {
        if !self.is_available() {
            return Err(RecognitionError::unsupported());
        }
        if self.state == SessionState::PermissionDenied {
            return Err(RecognitionError::permission_denied());
        }
        Ok(())
    }

    /// Start listening; idempotent while already listening
    pub(crate) fn begin(&mut self, continuous: bool) -> Result<(), RecognitionError> {
        self.check_startable()?;

        if self.state == SessionState::Listening {
            tracing::debug!("already listening, start ignored");
            return Ok(());
        }

        self.continuous_intent = continuous;
        self.launch();
        Ok(())
    }

    /// Stop listening and drop the continuous intent
    pub(crate) fn stop(&mut self) {
        self.continuous_intent = false;
        self.halt();
        if matches!(
            self.state,
            SessionState::Listening | SessionState::PausedForOutput
        ) {
            self.state = SessionState::Idle;
        }
    }

    /// Stop the engine for speech output, keeping the intent to resume
    pub(crate) fn pause(&mut self) -> bool {
        if self.state != SessionState::Listening {
            return false;
        }
        self.halt();
        self.state = SessionState::PausedForOutput;
        tracing::debug!(resume = self.continuous_intent, "recognition paused for output");
        true
    }

    /// Leave the paused state, restarting the engine if continuous
    pub(crate) fn resume(&mut self) {
        if self.state != SessionState::PausedForOutput {
            return;
        }

        if self.continuous_intent {
            tracing::debug!("resuming recognition after output");
            self.launch();
        } else {
            self.state = SessionState::Idle;
        }
    }

    /// Clear a permission denial so `start` may try again
    pub(crate) fn reset_permission(&mut self) -> bool {
        if self.state != SessionState::PermissionDenied {
            return false;
        }
        self.state = SessionState::Idle;
        tracing::info!("recognition permission flag reset");
        true
    }

    pub(crate) fn record_transcript(&mut self, interim: &str, final_text: &str) {
        let current = if interim.is_empty() { final_text } else { interim };
        current.clone_into(&mut self.current_transcript);
    }

    /// Handle the end of the active session
    ///
    /// Restarts the engine when listening continuously. Output never
    /// overlaps a listening session: `pause` retires the session first.
    pub(crate) fn on_ended(&mut self) {
        let session = self.active.take();

        if self.state != SessionState::Listening {
            return;
        }

        if !self.continuous_intent {
            tracing::debug!(?session, "recognition ended");
            self.state = SessionState::Idle;
            return;
        }

        tracing::debug!(?session, "recognition ended, restarting (continuous)");
        self.state = SessionState::Idle;
        self.launch();
    }

    /// Handle an engine error on the active session
    ///
    /// Returns the error to surface to listeners, if any.
    pub(crate) fn on_error(&mut self, code: String) -> Option<RecognitionError> {
        let error = RecognitionError::from_code(code);

        match error.kind {
            RecognitionErrorKind::PermissionDenied => {
                let first = self.state != SessionState::PermissionDenied;
                self.continuous_intent = false;
                self.halt();
                self.state = SessionState::PermissionDenied;
                tracing::warn!(code = %error.code, "microphone permission denied, auto-restart disabled");
                first.then_some(error)
            }
            RecognitionErrorKind::Transient => {
                tracing::debug!(code = %error.code, "transient recognition error ignored");
                None
            }
            RecognitionErrorKind::Unsupported | RecognitionErrorKind::Other => {
                tracing::warn!(code = %error.code, "recognition error");
                Some(error)
            }
        }
    }

    /// Start a new engine session under the current intent
    fn launch(&mut self) -> bool {
        let session = self.next_session;
        self.next_session += 1;

        let options = RecognitionOptions {
            continuous: self.continuous_intent,
            ..self.options.clone()
        };
        let events = RecognitionEvents::new(session, self.tx.clone());

        match self.engine.start(&options, events) {
            Ok(()) => {
                self.active = Some(session);
                self.state = SessionState::Listening;
                tracing::info!(session, continuous = options.continuous, lang = %options.lang, "listening");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start recognition");
                self.state = SessionState::Idle;
                false
            }
        }
    }

    /// Stop the engine if a session is active
    fn halt(&mut self) {
        if let Some(session) = self.active.take() {
            self.engine.stop();
            tracing::debug!(session, "recognition engine stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingEngine {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl RecognitionEngine for CountingEngine {
        fn start(&self, _: &RecognitionOptions, _: RecognitionEvents) -> crate::Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller() -> (InputController, Arc<CountingEngine>) {
        let engine = Arc::new(CountingEngine::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let controller = InputController::new(
            Arc::clone(&engine) as Arc<dyn RecognitionEngine>,
            "ko-KR".to_string(),
            true,
            tx,
        );
        (controller, engine)
    }

    #[test]
    fn test_pause_and_resume_keep_intent() {
        let (mut input, engine) = controller();
        input.begin(true).unwrap();
        input.begin(true).unwrap();
        assert_eq!(engine.starts.load(Ordering::SeqCst), 1);

        assert!(input.pause());
        assert!(!input.pause());
        assert_eq!(input.state(), SessionState::PausedForOutput);
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);

        input.resume();
        assert!(input.is_listening());
        assert_eq!(engine.starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sessions_are_scoped() {
        let (mut input, _) = controller();
        input.begin(true).unwrap();
        assert!(input.accepts(1));

        input.on_ended();
        assert!(!input.accepts(1));
        assert!(input.accepts(2));

        input.stop();
        assert!(!input.accepts(2));
        assert_eq!(input.state(), SessionState::Idle);
    }

    #[test]
    fn test_end_after_pause_does_not_restart() {
        let (mut input, engine) = controller();
        input.begin(true).unwrap();
        assert!(input.pause());
        assert!(!input.accepts(1));

        input.on_ended();
        assert_eq!(input.state(), SessionState::PausedForOutput);
        assert_eq!(engine.starts.load(Ordering::SeqCst), 1);

        input.resume();
        assert!(input.accepts(2));
    }

    #[test]
    fn test_permission_error_surfaces_once() {
        let (mut input, engine) = controller();
        input.begin(true).unwrap();

        assert!(input.on_error(NOT_ALLOWED.to_string()).is_some());
        assert!(input.on_error(NOT_ALLOWED.to_string()).is_none());
        assert_eq!(input.state(), SessionState::PermissionDenied);
        assert_eq!(
            input.begin(true).unwrap_err(),
            RecognitionError::permission_denied()
        );
        assert_eq!(engine.starts.load(Ordering::SeqCst), 1);

        assert!(input.reset_permission());
        input.begin(false).unwrap();
        assert!(input.is_listening());
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            RecognitionError::from_code("not-allowed").kind,
            RecognitionErrorKind::PermissionDenied
        );
        assert_eq!(
            RecognitionError::from_code("service-not-allowed").kind,
            RecognitionErrorKind::PermissionDenied
        );
        assert_eq!(
            RecognitionError::from_code("no-speech").kind,
            RecognitionErrorKind::Transient
        );
        assert_eq!(
            RecognitionError::from_code("network").kind,
            RecognitionErrorKind::Other
        );
        assert_eq!(
            RecognitionError::unsupported().kind,
            RecognitionErrorKind::Unsupported
        );
    }

    #[test]
    fn test_codes_pass_through_unmodified() {
        let error = RecognitionError::from_code("audio-capture");
        assert_eq!(error.code, "audio-capture");
        assert_eq!(error.to_string(), "audio-capture");
        assert!(error.is_surfaced());
        assert!(!RecognitionError::from_code("no-speech").is_surfaced());
    }
}
