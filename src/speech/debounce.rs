//! Finalization debouncer
//!
//! Recognizers often emit several "final" fragments while the speaker
//! pauses mid-sentence. The debouncer holds the latest fragment and only
//! commits it after a quiet period with no superseding interim or final
//! event. At most one timer is ever live.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Default quiet period before a final fragment is committed
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Buffered final fragment awaiting its quiet period
#[derive(Debug)]
struct PendingFinal {
    text: String,
    seq: u64,
    timer: JoinHandle<()>,
}

/// Cancel-and-replace buffer for final transcript fragments
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<PendingFinal>,
    seq: u64,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Debouncer {
    /// Create a debouncer with the given quiet period
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            seq: 0,
        }
    }

    /// Configured quiet period
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Buffer a final fragment and (re)start the timer
    ///
    /// Replaces any pending fragment. When the quiet period elapses,
    /// `on_fire` is called with the sequence number to hand back to
    /// [`Self::take`]. Must be called within a tokio runtime.
    pub fn push_final<F>(&mut self, text: impl Into<String>, on_fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();

        self.seq += 1;
        let seq = self.seq;
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(seq);
        });

        self.pending = Some(PendingFinal {
            text: text.into(),
            seq,
            timer,
        });
        seq
    }

    /// Pop the buffered text if `seq` is still the live timer
    ///
    /// A timer that raced with a cancel or replacement gets `None`.
    pub fn take(&mut self, seq: u64) -> Option<String> {
        if self.pending.as_ref().is_some_and(|p| p.seq == seq) {
            self.pending.take().map(|p| p.text)
        } else {
            None
        }
    }

    /// Drop the buffered fragment and abort its timer
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.timer.abort();
            tracing::trace!(seq = pending.seq, "pending final discarded");
        }
    }

    /// Whether a fragment is waiting for its quiet period
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Buffered fragment, if any
    #[must_use]
    pub fn pending_text(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.text.as_str())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_quiet_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::default();

        let seq = debouncer.push_final("스테디 와퍼", move |seq| {
            let _ = tx.send(seq);
        });

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rx.try_recv().ok(), Some(seq));
        assert_eq!(debouncer.take(seq).as_deref(), Some("스테디 와퍼"));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_restarts_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::default();

        let first_tx = tx.clone();
        let first = debouncer.push_final("스테디", move |seq| {
            let _ = first_tx.send(seq);
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        let second = debouncer.push_final("스테디 와퍼", move |seq| {
            let _ = tx.send(seq);
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err(), "first timer must have been aborted");

        tokio::time::sleep(Duration::from_millis(201)).await;
        assert_eq!(rx.try_recv().ok(), Some(second));
        assert_eq!(debouncer.take(first), None);
        assert_eq!(debouncer.take(second).as_deref(), Some("스테디 와퍼"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_buffer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::default();

        let seq = debouncer.push_final("카드 결제", move |seq| {
            let _ = tx.send(seq);
        });
        debouncer.cancel();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(debouncer.take(seq), None);
        assert_eq!(debouncer.pending_text(), None);
    }
}
