//! Network transport layer for inbound clipboard synchronization
//!
//! This module defines the session seam used by the reconnect supervisor:
//! a [`Connector`] opens one [`SessionHandle`] per attempt and reports the
//! session's lifecycle through [`SessionEvents`]. The production connector
//! lives in [`websocket`]; [`mock`] provides a scriptable one for tests.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::http::Uri;
use tracing::debug;

#[cfg(test)]
pub mod mock;
pub mod reconnect;
pub mod websocket;

#[cfg(test)]
pub use mock::MockConnector;
pub use reconnect::{Backoff, ReconnectionConfig};
pub use websocket::{WebSocketConfig, WebSocketConnector};

/// Port the paired computer listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 8081;

/// Close code for an orderly local shutdown or explicit disconnect
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code used when a session is replaced by a newer connect request
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Transport layer errors with user-friendly messages
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport could not be established
    #[error("CS003: Connection failed: {message}. Check if the paired computer is online and accessible.")]
    Connect { message: String },

    /// A write was attempted without an open session
    #[error("CS016: Cannot send: {message}")]
    Send { message: String },

    /// The session died after opening
    #[error("CS009: Connection lost: {message}. The paired computer may have gone offline or network connectivity was lost.")]
    Failure { message: String },

    /// No pong arrived within one keep-alive interval
    #[error("CS010: Keep-alive timed out after {secs}s without a reply from the paired computer.")]
    KeepAliveTimeout { secs: u64 },

    /// Opening the session took too long
    #[error("CS010: Connection attempt timed out after {secs}s. Check your network connection and try again.")]
    Timeout { secs: u64 },
}

impl TransportError {
    pub fn connect(message: impl Into<String>) -> Self {
        TransportError::Connect {
            message: message.into(),
        }
    }

    pub fn send(message: impl Into<String>) -> Self {
        TransportError::Send {
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        TransportError::Failure {
            message: message.into(),
        }
    }
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Address of the paired computer: a host plus the agreed port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Websocket URL for this endpoint. The link is deliberately plain `ws`.
    pub fn url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("ws://[{}]:{}", self.host, self.port)
        } else {
            format!("ws://{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Extract the host from a scanned pairing code.
///
/// Accepts `ws://host:port`, `http://host:port` or a bare host. The port in
/// the code is ignored; the client always uses its configured port. Returns
/// `None` for blank input or a code without a host.
pub fn parse_pairing_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }

    if !code.contains("://") {
        return Some(code.to_string());
    }

    let uri: Uri = match code.parse() {
        Ok(uri) => uri,
        Err(e) => {
            debug!("Rejecting pairing code {:?}: {}", code, e);
            return None;
        }
    };

    match uri.scheme_str() {
        Some("ws") | Some("http") => {}
        other => {
            debug!("Rejecting pairing code with scheme {:?}", other);
            return None;
        }
    }

    uri.host()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']'))
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

/// Monotonic identity of one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Which side started a close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseInitiator {
    Local,
    Remote,
}

/// Lifecycle event reported by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connection established; at most once
    Opened,

    /// One inbound clipboard snapshot
    Message(String),

    /// Terminal: clean or unclean close
    Closed {
        code: u16,
        reason: String,
        initiator: CloseInitiator,
    },

    /// Terminal: never opened, or died after opening
    Failed(TransportError),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Closed { .. } | SessionEvent::Failed(_))
    }
}

/// Session event tagged with the session that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnvelope {
    pub session: SessionId,
    pub event: SessionEvent,
}

/// Event emitter handed to a connector for one session.
///
/// The terminal methods consume the emitter, so a session reports exactly
/// one `closed` or `failed`. If the emitter is dropped without either, a
/// `Failed` event is sent on drop.
pub struct SessionEvents {
    session: SessionId,
    tx: Option<mpsc::UnboundedSender<SessionEnvelope>>,
    opened: bool,
}

impl SessionEvents {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEnvelope>) -> Self {
        Self {
            session,
            tx: Some(tx),
            opened: false,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Report that the connection is established. Repeated calls are ignored.
    pub fn opened(&mut self) {
        if self.opened {
            return;
        }
        self.opened = true;
        self.emit(SessionEvent::Opened);
    }

    pub fn message(&self, payload: String) {
        self.emit(SessionEvent::Message(payload));
    }

    pub fn closed(mut self, code: u16, reason: impl Into<String>, initiator: CloseInitiator) {
        self.emit(SessionEvent::Closed {
            code,
            reason: reason.into(),
            initiator,
        });
        self.tx = None;
    }

    pub fn failed(mut self, error: TransportError) {
        self.emit(SessionEvent::Failed(error));
        self.tx = None;
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.tx {
            // The supervisor may already be gone during shutdown.
            let _ = tx.send(SessionEnvelope {
                session: self.session,
                event,
            });
        }
    }
}

impl Drop for SessionEvents {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.emit(SessionEvent::Failed(TransportError::failure(
                "session ended without reporting a close",
            )));
        }
    }
}

/// Handle to one live session, owned by the supervisor
#[async_trait]
pub trait SessionHandle: Send + Sync {
    fn id(&self) -> SessionId;

    /// Whether the session has opened and not yet terminated
    fn is_open(&self) -> bool;

    /// Queue one text payload; fails with [`TransportError::Send`] if not open
    async fn send(&self, payload: String) -> Result<()>;

    /// Request a close. Completion is reported through the session's events.
    fn close(&self, code: u16, reason: &str);

    /// Wait until the session's transport has shut down
    async fn closed(&self);
}

/// Factory for sessions
pub trait Connector: Send + Sync {
    /// Start opening a session. Returns immediately; the outcome is
    /// reported through `events`.
    fn open(&self, endpoint: &Endpoint, events: SessionEvents) -> Box<dyn SessionHandle>;
}
