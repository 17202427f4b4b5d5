//! Error types for the kiosk speech engine

use thiserror::Error;

/// Result type alias for kiosk speech operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the kiosk speech engine
///
/// Nothing here crosses the coordinator's public surface as a return value:
/// engine failures are reported through listeners or logged. These variants
/// exist for engine implementations, configuration loading and the
/// transcript log client.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech recognition engine error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Speech synthesis engine error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Transcript log endpoint error
    #[error("transcript log error: {0}")]
    TranscriptLog(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
