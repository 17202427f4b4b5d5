//! Kiosk Speech - speech coordination engine for a voice-driven ordering kiosk
//!
//! This library arbitrates one microphone and one speaker:
//! - Continuous recognition with auto-restart and permission tracking
//! - Debounced commitment of final transcripts
//! - Echo suppression so the kiosk never "hears" its own voice
//! - Utterance lifecycle with exactly-once completion
//! - A text injection channel for testing without audio hardware
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Kiosk screens / host                  │
//! │   on_result  │  on_error  │  speak  │  test input    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                SpeechCoordinator                     │
//! │  Input  │  Debouncer  │  Echo filter  │  Output      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   RecognitionEngine        │     SynthesisEngine     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod speech;
pub mod transcript_log;

pub use config::Config;
pub use error::{Error, Result};
pub use speech::{
    EchoFilter, EchoVerdict, ListenerId, RecencyPolicy, RecognitionEngine, RecognitionError,
    RecognitionErrorKind, SpeakOptions, SpeechCoordinator, SpeechHandle, SpeechOutcome,
    SynthesisEngine, TranscriptEvent, TurnState,
};
pub use transcript_log::{HttpTranscriptSink, TranscriptRecord, TranscriptSink};
