//! Clipboard abstraction layer
//!
//! The clipboard is owned by the host system; this crate only reads it
//! before writing to it. [`SystemClipboard`] talks to the desktop
//! clipboard through `arboard`, [`MemoryClipboard`] keeps the value
//! in-process for tests and headless embedding.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

pub mod sink;

pub use sink::{ApplyOutcome, ClipboardSink};

/// Maximum clipboard content size (5MB)
pub const MAX_CLIPBOARD_SIZE: usize = 5 * 1024 * 1024;

/// Clipboard errors
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// Platform-specific error
    #[error("Platform error: {0}")]
    Platform(String),

    /// The clipboard could not be reached at all
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),
}

/// Text clipboard provider
#[async_trait]
pub trait ClipboardProvider: Send + Sync {
    /// Current text content, `None` when empty or not text
    async fn get_text(&self) -> Result<Option<String>, ClipboardError>;

    /// Replace the clipboard content with `text`
    async fn set_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Get provider name
    fn name(&self) -> &'static str;
}

/// Desktop clipboard backed by `arboard`.
///
/// Every call opens a fresh handle on the blocking pool, since clipboard
/// access may block on the display server.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClipboardProvider for SystemClipboard {
    async fn get_text(&self) -> Result<Option<String>, ClipboardError> {
        tokio::task::spawn_blocking(|| {
            let mut clipboard = arboard::Clipboard::new()
                .map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
            match clipboard.get_text() {
                Ok(text) => Ok(Some(text)),
                Err(arboard::Error::ContentNotAvailable) => Ok(None),
                Err(e) => Err(ClipboardError::Platform(e.to_string())),
            }
        })
        .await
        .map_err(|e| ClipboardError::Platform(e.to_string()))?
    }

    async fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        let text = text.to_string();
        tokio::task::spawn_blocking(move || {
            let mut clipboard = arboard::Clipboard::new()
                .map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
            clipboard
                .set_text(text)
                .map_err(|e| ClipboardError::Platform(e.to_string()))
        })
        .await
        .map_err(|e| ClipboardError::Platform(e.to_string()))?
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// In-process clipboard that counts writes
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    inner: Arc<Mutex<MemoryClipboardInner>>,
}

#[derive(Debug, Default)]
struct MemoryClipboardInner {
    text: Option<String>,
    writes: usize,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        let clipboard = Self::default();
        clipboard.lock().text = Some(text.into());
        clipboard
    }

    pub fn text(&self) -> Option<String> {
        self.lock().text.clone()
    }

    /// Number of successful `set_text` calls
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, MemoryClipboardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ClipboardProvider for MemoryClipboard {
    async fn get_text(&self) -> Result<Option<String>, ClipboardError> {
        Ok(self.text())
    }

    async fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut inner = self.lock();
        inner.text = Some(text.to_string());
        inner.writes += 1;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
