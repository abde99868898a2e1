//! Applies inbound payloads to the local clipboard
//!
//! The sink reads the clipboard before writing and skips payloads equal to
//! the current text, so a value the peer just mirrored back is not written
//! again. The read and the write are not atomic with respect to other
//! writers of the system clipboard.

use super::{ClipboardError, ClipboardProvider};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of applying one payload
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The clipboard now holds the payload
    Written,

    /// The clipboard already held the payload; nothing was written
    Unchanged,

    /// The payload exceeded the configured size limit
    Rejected { size: usize, max: usize },

    /// Reading or writing the clipboard failed
    Failed(ClipboardError),
}

impl ApplyOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, ApplyOutcome::Written)
    }
}

/// Writes inbound payloads to a clipboard provider with loop suppression
#[derive(Clone)]
pub struct ClipboardSink {
    clipboard: Arc<dyn ClipboardProvider>,
    max_size: usize,
}

impl ClipboardSink {
    pub fn new(clipboard: Arc<dyn ClipboardProvider>, max_size: usize) -> Self {
        Self {
            clipboard,
            max_size,
        }
    }

    /// Apply one payload. Never fails; problems are logged and reported in
    /// the outcome.
    pub async fn apply(&self, payload: &str) -> ApplyOutcome {
        if payload.len() > self.max_size {
            warn!(
                "Ignoring inbound clipboard update of {} bytes (max: {} bytes)",
                payload.len(),
                self.max_size
            );
            return ApplyOutcome::Rejected {
                size: payload.len(),
                max: self.max_size,
            };
        }

        match self.clipboard.get_text().await {
            Ok(Some(current)) if current == payload => {
                debug!("Clipboard already holds inbound payload, skipping write");
                return ApplyOutcome::Unchanged;
            }
            Ok(_) => {}
            Err(e) => {
                // Still attempt the write; an unreadable clipboard may be writable.
                debug!("Could not read clipboard before write: {}", e);
            }
        }

        match self.clipboard.set_text(payload).await {
            Ok(()) => {
                info!(
                    "Updated {} clipboard ({} bytes)",
                    self.clipboard.name(),
                    payload.len()
                );
                ApplyOutcome::Written
            }
            Err(e) => {
                warn!("Failed to update local clipboard: {}", e);
                ApplyOutcome::Failed(e)
            }
        }
    }
}

impl std::fmt::Debug for ClipboardSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipboardSink")
            .field("provider", &self.clipboard.name())
            .field("max_size", &self.max_size)
            .finish()
    }
}
