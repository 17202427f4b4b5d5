//! TOML configuration file loading
//!
//! Supports `~/.config/kiosk-speech/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::speech::RecencyPolicy;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct KioskConfigFile {
    /// Recognition and synthesis settings
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Echo suppression settings
    #[serde(default)]
    pub echo: EchoFileConfig,

    /// Transcript log forwarding
    #[serde(default)]
    pub transcript_log: TranscriptLogFileConfig,
}

/// Recognition and synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// BCP-47 language tag (e.g. "ko-KR")
    pub lang: Option<String>,

    /// Forward interim results to listeners
    pub interim_results: Option<bool>,

    /// Quiet period before a final fragment is committed
    pub debounce_ms: Option<u64>,

    /// Bound on waiting for the voice list
    pub voice_ready_timeout_ms: Option<u64>,

    /// Default speaking rate
    pub rate: Option<f32>,

    /// Default pitch
    pub pitch: Option<f32>,

    /// Default volume
    pub volume: Option<f32>,
}

/// Echo suppression configuration
#[derive(Debug, Default, Deserialize)]
pub struct EchoFileConfig {
    /// Window after an utterance ends during which input is dropped
    pub recency_window_ms: Option<u64>,

    /// Character overlap ratio that counts as an echo
    pub similarity_threshold: Option<f64>,

    /// Number of recent utterances compared against
    pub history_capacity: Option<usize>,

    /// Phrases never suppressed by the similarity check
    pub protected_keywords: Option<Vec<String>>,

    /// "unconditional" or "exempt-protected-keywords"
    pub recency_policy: Option<RecencyPolicy>,
}

/// Transcript log configuration
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptLogFileConfig {
    pub enabled: Option<bool>,
    pub url: Option<String>,
    pub source: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `KioskConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> KioskConfigFile {
    let Some(path) = config_file_path() else {
        return KioskConfigFile::default();
    };

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path
pub fn load_config_file_from(path: &Path) -> KioskConfigFile {
    if !path.exists() {
        return KioskConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                KioskConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            KioskConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/kiosk-speech/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("kiosk-speech").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_parses() {
        let fc: KioskConfigFile = toml::from_str(
            r#"
            [speech]
            lang = "en-US"
            debounce_ms = 700

            [echo]
            recency_policy = "exempt-protected-keywords"
            protected_keywords = ["결제", "포장"]
            "#,
        )
        .unwrap();

        assert_eq!(fc.speech.lang.as_deref(), Some("en-US"));
        assert_eq!(fc.speech.debounce_ms, Some(700));
        assert_eq!(fc.speech.rate, None);
        assert_eq!(
            fc.echo.recency_policy,
            Some(RecencyPolicy::ExemptProtectedKeywords)
        );
        assert_eq!(fc.echo.protected_keywords.unwrap().len(), 2);
        assert!(fc.transcript_log.url.is_none());
    }

    #[test]
    fn test_missing_file_is_default() {
        let fc = load_config_file_from(Path::new("/nonexistent/kiosk-speech/config.toml"));
        assert!(fc.speech.lang.is_none());
    }
}
