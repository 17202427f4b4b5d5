//! Speech coordination
//!
//! Arbitrates one microphone and one speaker between a recognition engine
//! and a synthesis engine. The pieces, bottom-up:
//!
//! - [`engine`]: the capability traits hosts implement
//! - [`input`]: recognition session state, auto-restart, permission errors
//! - [`debounce`]: holds final fragments until the speaker pauses
//! - [`echo`] and [`recent`]: drop transcripts of the kiosk's own voice
//! - [`output`]: utterance lifecycle and completion handles
//! - [`coordinator`]: turn-taking between the two sides
//! - [`test_input`]: text injection that bypasses all of the above

pub mod coordinator;
pub mod debounce;
pub mod echo;
pub mod engine;
pub mod input;
mod listeners;
pub mod output;
pub mod recent;
pub mod test_input;

pub use coordinator::{SpeechCoordinator, TranscriptEvent, TurnState};
pub use debounce::{DEFAULT_DEBOUNCE, Debouncer};
pub use echo::{
    DEFAULT_PROTECTED_KEYWORDS, DEFAULT_RECENCY_WINDOW, DEFAULT_SIMILARITY_THRESHOLD, EchoFilter,
    EchoVerdict, ProtectedKeywords, RecencyPolicy, char_overlap_ratio, normalize,
};
pub use engine::{
    RecognitionEngine, RecognitionEvent, RecognitionEvents, RecognitionOptions, SessionId,
    SynthesisEngine, SynthesisEvent, Utterance, UtteranceEvents, UtteranceId, Voice,
};
pub use input::{RecognitionError, RecognitionErrorKind, SessionState};
pub use listeners::ListenerId;
pub use output::{
    DEFAULT_VOICE_READY_TIMEOUT, SpeakOptions, SpeechHandle, SpeechOutcome, UtteranceLifecycle,
};
pub use recent::{DEFAULT_CAPACITY as DEFAULT_HISTORY_CAPACITY, RecentOutputEntry, RecentOutputLog};
pub use test_input::TestInputChannel;
