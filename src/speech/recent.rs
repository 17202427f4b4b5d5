//! Bounded history of recently synthesized text

use std::collections::VecDeque;

use tokio::time::Instant;

/// Default number of utterances remembered
pub const DEFAULT_CAPACITY: usize = 10;

/// A synthesized utterance as seen by the echo filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentOutputEntry {
    /// Normalized text (see [`super::echo::normalize`])
    pub normalized_text: String,
    /// When speaking began
    pub at: Instant,
}

/// Sliding window of the last N synthesized utterances, oldest evicted first
#[derive(Debug)]
pub struct RecentOutputLog {
    entries: VecDeque<RecentOutputEntry>,
    capacity: usize,
}

impl Default for RecentOutputLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl RecentOutputLog {
    /// Create a log holding at most `capacity` entries (minimum 1)
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a normalized utterance
    ///
    /// Empty text is ignored: it would match every candidate by containment.
    pub fn record(&mut self, normalized_text: impl Into<String>, at: Instant) {
        let normalized_text = normalized_text.into();
        if normalized_text.is_empty() {
            return;
        }

        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(RecentOutputEntry { normalized_text, at });
    }

    /// Entries from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &RecentOutputEntry> {
        self.entries.iter()
    }

    /// Number of entries held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries held
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_first() {
        let mut log = RecentOutputLog::with_capacity(3);
        let now = Instant::now();
        for text in ["하나", "둘", "셋", "넷"] {
            log.record(text, now);
        }

        let texts: Vec<_> = log.iter().map(|e| e.normalized_text.as_str()).collect();
        assert_eq!(texts, ["둘", "셋", "넷"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_never_exceeds_default_capacity() {
        let mut log = RecentOutputLog::default();
        let now = Instant::now();
        for i in 0..25 {
            log.record(format!("안내 {i}"), now);
        }

        assert_eq!(log.len(), DEFAULT_CAPACITY);
        assert_eq!(
            log.iter().next().map(|e| e.normalized_text.as_str()),
            Some("안내 15")
        );
    }

    #[test]
    fn test_ignores_empty_text() {
        let mut log = RecentOutputLog::default();
        log.record("", Instant::now());
        assert!(log.is_empty());
    }
}
