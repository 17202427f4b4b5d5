//! Transcript log forwarding
//!
//! Copies of committed transcripts can be shipped to a backend for later
//! analysis. Forwarding is fire-and-forget: a slow or failing endpoint
//! never delays or blocks transcript delivery.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::TranscriptLogConfig;
use crate::{Error, Result};

/// One committed transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRecord {
    /// Committed text, after debouncing and echo filtering
    pub text: String,
    /// Recognition language
    pub lang: String,
    /// When the transcript was committed
    pub timestamp: DateTime<Utc>,
}

impl TranscriptRecord {
    /// Record `text` as committed now
    #[must_use]
    pub fn new(text: impl Into<String>, lang: &str) -> Self {
        Self {
            text: text.into(),
            lang: lang.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Destination for committed transcripts
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    /// Deliver one record
    ///
    /// # Errors
    ///
    /// Returns error if the record could not be delivered
    async fn send(&self, record: &TranscriptRecord) -> Result<()>;
}

/// Posts transcripts as JSON to an HTTP endpoint
pub struct HttpTranscriptSink {
    client: reqwest::Client,
    url: String,
    source: String,
}

impl HttpTranscriptSink {
    /// Create a sink posting to `url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty or the HTTP client cannot be built
    pub fn new(url: impl Into<String>, source: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::Config("transcript log URL required".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            source: source.into(),
        })
    }

    /// Build a sink from configuration; `None` when forwarding is disabled
    ///
    /// # Errors
    ///
    /// Returns error if forwarding is enabled without a usable URL
    pub fn from_config(config: &TranscriptLogConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("transcript log enabled without a URL".to_string()))?;
        Self::new(url, config.source.clone(), config.timeout).map(Some)
    }

    /// Endpoint receiving the records
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Serialize)]
struct TranscriptPayload<'a> {
    text: &'a str,
    source: &'a str,
    lang: &'a str,
    timestamp: &'a DateTime<Utc>,
}

impl<'a> TranscriptPayload<'a> {
    fn new(record: &'a TranscriptRecord, source: &'a str) -> Self {
        Self {
            text: &record.text,
            source,
            lang: &record.lang,
            timestamp: &record.timestamp,
        }
    }
}

#[async_trait]
impl TranscriptSink for HttpTranscriptSink {
    async fn send(&self, record: &TranscriptRecord) -> Result<()> {
        let payload = TranscriptPayload::new(record, &self.source);

        let response = self.client.post(&self.url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TranscriptLog(format!("{status}: {body}")));
        }

        tracing::debug!(url = %self.url, text = %record.text, "transcript forwarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let record = TranscriptRecord::new("카드 결제", "ko-KR");
        let payload = TranscriptPayload::new(&record, "speech-recognition");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["text"], "카드 결제");
        assert_eq!(json["source"], "speech-recognition");
        assert_eq!(json["lang"], "ko-KR");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_from_config_disabled() {
        let config = TranscriptLogConfig::default();
        assert!(HttpTranscriptSink::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(HttpTranscriptSink::new("  ", "speech-recognition", Duration::from_secs(1)).is_err());
    }
}
