//! Configuration management for the kiosk speech engine

pub mod file;

use std::str::FromStr;
use std::time::Duration;

use crate::speech::{
    DEFAULT_DEBOUNCE, DEFAULT_PROTECTED_KEYWORDS, DEFAULT_RECENCY_WINDOW,
    DEFAULT_HISTORY_CAPACITY, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_VOICE_READY_TIMEOUT,
    RecencyPolicy,
};
use crate::{Error, Result};

use self::file::KioskConfigFile;

/// Default recognition and synthesis language
pub const DEFAULT_LANG: &str = "ko-KR";

/// Default `source` tag attached to forwarded transcripts
pub const DEFAULT_TRANSCRIPT_SOURCE: &str = "speech-recognition";

/// Kiosk speech configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Recognition and synthesis settings
    pub speech: SpeechConfig,

    /// Echo suppression settings
    pub echo: EchoConfig,

    /// Transcript log forwarding
    pub transcript_log: TranscriptLogConfig,
}

/// Recognition and synthesis configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// BCP-47 language tag for both engines
    pub lang: String,

    /// Forward interim results to listeners
    pub interim_results: bool,

    /// Quiet period before a final fragment is committed
    pub debounce: Duration,

    /// Bound on waiting for the synthesis voice list
    pub voice_ready_timeout: Duration,

    /// Default speaking rate multiplier
    pub rate: f32,

    /// Default pitch multiplier
    pub pitch: f32,

    /// Default volume (0.0 to 1.0)
    pub volume: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            lang: DEFAULT_LANG.to_string(),
            interim_results: true,
            debounce: DEFAULT_DEBOUNCE,
            voice_ready_timeout: DEFAULT_VOICE_READY_TIMEOUT,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// Echo suppression configuration
#[derive(Debug, Clone)]
pub struct EchoConfig {
    /// Window after an utterance ends during which all input is dropped
    pub recency_window: Duration,

    /// Character overlap ratio at which a candidate counts as an echo
    pub similarity_threshold: f64,

    /// Number of recent utterances compared against
    pub history_capacity: usize,

    /// Phrases exempt from the similarity check
    pub protected_keywords: Vec<String>,

    /// Whether protected keywords also bypass the recency window
    pub recency_policy: RecencyPolicy,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            recency_window: DEFAULT_RECENCY_WINDOW,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            protected_keywords: DEFAULT_PROTECTED_KEYWORDS
                .iter()
                .map(ToString::to_string)
                .collect(),
            recency_policy: RecencyPolicy::default(),
        }
    }
}

/// Transcript log forwarding configuration
#[derive(Debug, Clone)]
pub struct TranscriptLogConfig {
    /// Forward committed transcripts
    pub enabled: bool,

    /// Endpoint receiving the JSON records
    pub url: Option<String>,

    /// `source` tag attached to each record
    pub source: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for TranscriptLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            source: DEFAULT_TRANSCRIPT_SOURCE.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if an environment override or file value is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with overrides from `env`
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range or unparsable
    pub fn resolve<F>(fc: KioskConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // Speech config (env > toml > default)
        let speech = SpeechConfig {
            lang: env("KIOSK_SPEECH_LANG")
                .or(fc.speech.lang)
                .unwrap_or(defaults.speech.lang),
            interim_results: fc
                .speech
                .interim_results
                .unwrap_or(defaults.speech.interim_results),
            debounce: parse_env::<u64>(&env, "KIOSK_DEBOUNCE_MS")?
                .or(fc.speech.debounce_ms)
                .map_or(defaults.speech.debounce, Duration::from_millis),
            voice_ready_timeout: parse_env::<u64>(&env, "KIOSK_VOICE_TIMEOUT_MS")?
                .or(fc.speech.voice_ready_timeout_ms)
                .map_or(defaults.speech.voice_ready_timeout, Duration::from_millis),
            rate: fc.speech.rate.unwrap_or(defaults.speech.rate),
            pitch: fc.speech.pitch.unwrap_or(defaults.speech.pitch),
            volume: fc.speech.volume.unwrap_or(defaults.speech.volume),
        };

        // Echo config (env > toml > default)
        let echo = EchoConfig {
            recency_window: parse_env::<u64>(&env, "KIOSK_ECHO_WINDOW_MS")?
                .or(fc.echo.recency_window_ms)
                .map_or(defaults.echo.recency_window, Duration::from_millis),
            similarity_threshold: parse_env::<f64>(&env, "KIOSK_ECHO_THRESHOLD")?
                .or(fc.echo.similarity_threshold)
                .unwrap_or(defaults.echo.similarity_threshold),
            history_capacity: fc
                .echo
                .history_capacity
                .unwrap_or(defaults.echo.history_capacity),
            protected_keywords: fc
                .echo
                .protected_keywords
                .unwrap_or(defaults.echo.protected_keywords),
            recency_policy: parse_env::<RecencyPolicy>(&env, "KIOSK_RECENCY_POLICY")?
                .or(fc.echo.recency_policy)
                .unwrap_or(defaults.echo.recency_policy),
        };

        // Transcript log (env URL enables it)
        let env_url = env("KIOSK_TRANSCRIPT_LOG_URL");
        let transcript_log = TranscriptLogConfig {
            enabled: env_url.is_some()
                || fc
                    .transcript_log
                    .enabled
                    .unwrap_or(defaults.transcript_log.enabled),
            url: env_url.or(fc.transcript_log.url),
            source: fc
                .transcript_log
                .source
                .unwrap_or(defaults.transcript_log.source),
            timeout: fc
                .transcript_log
                .timeout_ms
                .map_or(defaults.transcript_log.timeout, Duration::from_millis),
        };

        let config = Self {
            speech,
            echo,
            transcript_log,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.speech.lang.trim().is_empty() {
            return Err(Error::Config("speech.lang must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.echo.similarity_threshold) {
            return Err(Error::Config(format!(
                "echo.similarity_threshold must be within 0.0..=1.0, got {}",
                self.echo.similarity_threshold
            )));
        }
        if self.echo.history_capacity == 0 {
            return Err(Error::Config(
                "echo.history_capacity must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.speech.volume) {
            return Err(Error::Config(format!(
                "speech.volume must be within 0.0..=1.0, got {}",
                self.speech.volume
            )));
        }
        if self.transcript_log.enabled && self.transcript_log.url.is_none() {
            return Err(Error::Config(
                "transcript_log.enabled requires transcript_log.url".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("invalid {key}={raw}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(KioskConfigFile::default(), |_| None).unwrap();
        assert_eq!(config.speech.lang, "ko-KR");
        assert_eq!(config.speech.debounce, Duration::from_millis(500));
        assert_eq!(config.speech.voice_ready_timeout, Duration::from_millis(1000));
        assert_eq!(config.echo.recency_window, Duration::from_millis(2000));
        assert!((config.echo.similarity_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.echo.history_capacity, 10);
        assert!(config.echo.protected_keywords.iter().any(|k| k == "결제"));
        assert_eq!(config.echo.recency_policy, RecencyPolicy::Unconditional);
        assert!(!config.transcript_log.enabled);
        assert_eq!(config.transcript_log.source, "speech-recognition");
    }

    #[test]
    fn test_env_overrides_file() {
        let fc: KioskConfigFile = toml::from_str(
            r#"
            [speech]
            lang = "en-US"
            debounce_ms = 700

            [echo]
            recency_window_ms = 3000
            "#,
        )
        .unwrap();

        let env = env_from(&[
            ("KIOSK_DEBOUNCE_MS", "250"),
            ("KIOSK_RECENCY_POLICY", "exempt"),
            ("KIOSK_TRANSCRIPT_LOG_URL", "http://localhost:8080/transcripts"),
        ]);
        let config = Config::resolve(fc, env).unwrap();

        assert_eq!(config.speech.lang, "en-US");
        assert_eq!(config.speech.debounce, Duration::from_millis(250));
        assert_eq!(config.echo.recency_window, Duration::from_millis(3000));
        assert_eq!(
            config.echo.recency_policy,
            RecencyPolicy::ExemptProtectedKeywords
        );
        assert!(config.transcript_log.enabled);
        assert_eq!(
            config.transcript_log.url.as_deref(),
            Some("http://localhost:8080/transcripts")
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = Config::resolve(
            KioskConfigFile::default(),
            env_from(&[("KIOSK_DEBOUNCE_MS", "soon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("KIOSK_DEBOUNCE_MS"));

        assert!(
            Config::resolve(
                KioskConfigFile::default(),
                env_from(&[("KIOSK_ECHO_THRESHOLD", "1.5")]),
            )
            .is_err()
        );

        assert!(
            Config::resolve(
                KioskConfigFile::default(),
                env_from(&[("KIOSK_RECENCY_POLICY", "sometimes")]),
            )
            .is_err()
        );
    }
}
