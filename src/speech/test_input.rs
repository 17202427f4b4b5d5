//! Test voice input channel
//!
//! A single registration slot the active screen installs so developers and
//! tests can feed literal text into voice-triggered behavior without audio
//! hardware. Injected text bypasses recognition, debouncing and echo
//! filtering entirely.

use std::sync::{Arc, Mutex, PoisonError};

type Handler = Arc<dyn Fn(&str) + Send + Sync>;

/// Single-slot bypass from a text source straight to the active handler
#[derive(Default)]
pub struct TestInputChannel {
    handler: Mutex<Option<Handler>>,
}

impl TestInputChannel {
    /// Install the handler, replacing any previous one
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let previous = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::new(handler));
        if previous.is_some() {
            tracing::debug!("test voice input handler replaced");
        }
    }

    /// Remove the installed handler
    pub fn clear_handler(&self) {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Whether a handler is installed
    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Forward `text` to the installed handler
    ///
    /// Returns `false` if no handler is installed.
    pub fn inject(&self, text: &str) -> bool {
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match handler {
            Some(handler) => {
                tracing::info!(text, "test voice input injected");
                handler(text);
                true
            }
            None => {
                tracing::warn!(text, "no test voice input handler installed");
                false
            }
        }
    }
}
