//! Echo feedback filter
//!
//! The kiosk speaker and microphone share one room, so the recognizer can
//! transcribe the kiosk's own voice. Two checks run in order on every
//! committed transcript:
//!
//! 1. Recency window: anything committed shortly after an utterance left the
//!    speaker is dropped.
//! 2. Similarity window: the candidate is compared with the recent output
//!    log by character overlap and substring containment. Candidates that
//!    mention a protected keyword skip this check.
//!
//! Whether protected keywords also skip the recency check is a named policy
//! ([`RecencyPolicy`]); by default they do not.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

use super::recent::RecentOutputLog;
use crate::config::EchoConfig;

/// Default recency window after an utterance ends
pub const DEFAULT_RECENCY_WINDOW: Duration = Duration::from_millis(2000);

/// Default character overlap ratio at which a candidate counts as an echo
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Domain phrases that are never suppressed by the similarity check
pub const DEFAULT_PROTECTED_KEYWORDS: &[&str] = &[
    "결제",
    "포장",
    "매장",
    "카드",
    "현금",
    "기프티콘",
    "삼성페이",
    "애플페이",
    "주문 완료",
    "주문 확인",
    "와퍼",
    "치즈버거",
    "아메리카노",
    "카페라떼",
    "카푸치노",
];

/// How the recency window treats protected keywords
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecencyPolicy {
    /// Suppress everything inside the window, keywords included
    #[default]
    Unconditional,
    /// Let candidates containing a protected keyword through the window
    ExemptProtectedKeywords,
}

impl RecencyPolicy {
    /// Name as written in configuration
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unconditional => "unconditional",
            Self::ExemptProtectedKeywords => "exempt-protected-keywords",
        }
    }
}

impl std::str::FromStr for RecencyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unconditional" => Ok(Self::Unconditional),
            "exempt-protected-keywords" | "exempt" => Ok(Self::ExemptProtectedKeywords),
            other => Err(format!("unknown recency policy: {other}")),
        }
    }
}

/// Outcome of running a candidate through the filter
#[derive(Debug, Clone, PartialEq)]
pub enum EchoVerdict {
    /// Not an echo; deliver it
    Accept,
    /// Committed too soon after the kiosk stopped speaking
    RecentOutput {
        /// Time between the end of the last utterance and the check
        since_end: Duration,
    },
    /// Shares too many characters with a recent utterance
    Similar {
        /// The normalized utterance it resembles
        matched: String,
        /// Character overlap ratio
        ratio: f64,
    },
    /// Contains, or is contained in, a recent utterance
    Contained {
        /// The normalized utterance it overlaps
        matched: String,
    },
}

impl EchoVerdict {
    /// Whether the candidate should be dropped
    #[must_use]
    pub const fn is_suppressed(&self) -> bool {
        !matches!(self, Self::Accept)
    }
}

/// Normalized allow-list of domain-significant phrases
#[derive(Debug, Clone, Default)]
pub struct ProtectedKeywords {
    keywords: Vec<String>,
}

impl ProtectedKeywords {
    /// Build from raw phrases; blanks are dropped
    #[must_use]
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| normalize(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    /// First keyword found in an already-normalized text
    #[must_use]
    pub fn find_in(&self, normalized: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|k| normalized.contains(k.as_str()))
            .map(String::as_str)
    }

    /// Normalized keywords
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.keywords
    }
}

/// Suppresses recognizer output that is the kiosk hearing itself
#[derive(Debug, Clone)]
pub struct EchoFilter {
    recency_window: Duration,
    similarity_threshold: f64,
    keywords: ProtectedKeywords,
    policy: RecencyPolicy,
}

impl Default for EchoFilter {
    fn default() -> Self {
        Self {
            recency_window: DEFAULT_RECENCY_WINDOW,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            keywords: ProtectedKeywords::new(DEFAULT_PROTECTED_KEYWORDS),
            policy: RecencyPolicy::default(),
        }
    }
}

impl EchoFilter {
    /// Build a filter from configuration
    #[must_use]
    pub fn from_config(config: &EchoConfig) -> Self {
        Self {
            recency_window: config.recency_window,
            similarity_threshold: config.similarity_threshold,
            keywords: ProtectedKeywords::new(&config.protected_keywords),
            policy: config.recency_policy,
        }
    }

    /// Replace the recency policy
    #[must_use]
    pub const fn with_policy(mut self, policy: RecencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Active recency policy
    #[must_use]
    pub const fn policy(&self) -> RecencyPolicy {
        self.policy
    }

    /// Protected keywords in use
    #[must_use]
    pub const fn keywords(&self) -> &ProtectedKeywords {
        &self.keywords
    }

    /// Decide whether `candidate` is an echo of recent output
    ///
    /// `last_output_end` is when the last utterance left the speaking state.
    #[must_use]
    pub fn check(
        &self,
        candidate: &str,
        now: Instant,
        last_output_end: Option<Instant>,
        recent: &RecentOutputLog,
    ) -> EchoVerdict {
        let normalized = normalize(candidate);
        let keyword = self.keywords.find_in(&normalized);

        if let Some(end) = last_output_end {
            let since_end = now.saturating_duration_since(end);
            let exempt = self.policy == RecencyPolicy::ExemptProtectedKeywords && keyword.is_some();
            if since_end < self.recency_window && !exempt {
                return EchoVerdict::RecentOutput { since_end };
            }
        }

        if keyword.is_some() || normalized.is_empty() {
            return EchoVerdict::Accept;
        }

        for entry in recent.iter() {
            let spoken = entry.normalized_text.as_str();

            let ratio = char_overlap_ratio(&normalized, spoken);
            if ratio >= self.similarity_threshold {
                return EchoVerdict::Similar {
                    matched: spoken.to_string(),
                    ratio,
                };
            }

            if spoken.contains(normalized.as_str()) || normalized.contains(spoken) {
                return EchoVerdict::Contained {
                    matched: spoken.to_string(),
                };
            }
        }

        EchoVerdict::Accept
    }
}

/// Normalize text for comparison
///
/// Strips punctuation, collapses whitespace, trims and lowercases.
#[must_use]
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Character-set overlap between two strings
///
/// Counts the distinct characters of the shorter string that also occur in
/// the longer one, divided by the longer string's length in characters.
/// The result is symmetric and lies in `0.0..=1.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn char_overlap_ratio(a: &str, b: &str) -> f64 {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let (shorter, longer, longer_len) = if a_len <= b_len {
        (a, b, b_len)
    } else {
        (b, a, a_len)
    };

    if longer_len == 0 {
        return 0.0;
    }

    let longer_chars: HashSet<char> = longer.chars().collect();
    let shared = shorter
        .chars()
        .collect::<HashSet<char>>()
        .into_iter()
        .filter(|c| longer_chars.contains(c))
        .count();

    shared as f64 / longer_len as f64
}
