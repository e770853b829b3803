//! Presentation-side capabilities injected into the controller
//!
//! The controller never renders anything itself. It reports user-visible
//! failures to an `ErrorSink` (snackbar / toast) and asks a `Repaint`
//! to redraw after state changes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub trait ErrorSink: Send + Sync {
    fn report(&self, message: String);
}

pub trait Repaint: Send + Sync {
    fn request_repaint(&self);
}

/// Logs notifications instead of showing them
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, message: String) {
        tracing::warn!(%message, "user notification");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoRepaint;

impl Repaint for NoRepaint {
    fn request_repaint(&self) {}
}

/// Keeps every notification and counts repaint requests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
    repaints: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Remove and return what was reported so far
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn repaints(&self) -> usize {
        self.repaints.load(Ordering::SeqCst)
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, message: String) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }
}

impl Repaint for RecordingSink {
    fn request_repaint(&self) {
        self.repaints.fetch_add(1, Ordering::SeqCst);
    }
}
