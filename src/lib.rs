//! # ClipSync Client
//!
//! Keeps a persistent WebSocket link to a paired computer and mirrors the
//! text it pushes into the local clipboard.
//!
//! The moving parts:
//! - [`transport`] opens sessions and reports their lifecycle as events
//! - [`sync`] owns the reconnect supervisor and the [`ClipboardClient`] handle
//! - [`state`] publishes connection status to observers
//! - [`clipboard`] writes inbound payloads without echoing duplicates
//! - [`store`] remembers the last paired host between runs

pub mod cli;
pub mod clipboard;
pub mod config;
pub mod state;
pub mod store;
pub mod sync;
pub mod transport;

pub use config::Config;
pub use state::{ConnectionSnapshot, ConnectionState, ConnectionStatus};
pub use sync::ClipboardClient;

/// Result type alias for ClipSync client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ClipSync client operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Clipboard operation error
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] clipboard::ClipboardError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    /// Endpoint store error
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The client task is no longer running
    #[error("CS017: Client has stopped")]
    ClientStopped,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum clipboard payload size (5MB default)
pub const MAX_PAYLOAD_SIZE: usize = clipboard::MAX_CLIPBOARD_SIZE;
