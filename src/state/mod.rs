//! Observable connection state shared between the supervisor and any UI layer
//!
//! [`ConnectionState`] is an explicitly constructed register holding the
//! current [`ConnectionStatus`] and the paired host. Every change is broadcast
//! synchronously to all observers, in subscription order, with the full new
//! snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

/// Externally visible status of the link to the paired computer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// No session and no pending retry attempt in flight
    Disconnected,

    /// A session is being opened
    Connecting,

    /// A session is open and inbound updates are applied
    Connected,

    /// The last attempt failed; a retry may be scheduled
    Error,
}

impl ConnectionStatus {
    /// Static human-readable hint suitable for status text
    pub fn hint(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Not connected",
            ConnectionStatus::Connecting => "Connecting to the paired computer",
            ConnectionStatus::Connected => "Clipboard sync is active",
            ConnectionStatus::Error => "Cannot reach the paired computer; retrying",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Point-in-time value of the register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    pub endpoint: Option<String>,
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            endpoint: None,
        }
    }
}

/// Token returned by [`ConnectionState::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(&ConnectionSnapshot) + Send + Sync>;

struct Registry {
    snapshot: ConnectionSnapshot,
    observers: Vec<(ObserverId, Observer)>,
    next_id: u64,
}

/// Broadcast register for `{status, endpoint}`
///
/// Observers run on the thread performing the `set`, while a writer lock is
/// held, so they must return quickly and must not call back into a setter.
pub struct ConnectionState {
    registry: Mutex<Registry>,
    writer: Mutex<()>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry();
        f.debug_struct("ConnectionState")
            .field("snapshot", &registry.snapshot)
            .field("observers", &registry.observers.len())
            .finish()
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                snapshot: ConnectionSnapshot::default(),
                observers: Vec::new(),
                next_id: 1,
            }),
            writer: Mutex::new(()),
        }
    }

    pub fn get(&self) -> ConnectionSnapshot {
        self.registry().snapshot.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.registry().snapshot.status
    }

    pub fn endpoint(&self) -> Option<String> {
        self.registry().snapshot.endpoint.clone()
    }

    /// Update the status, notifying observers if it changed
    pub fn set_status(&self, status: ConnectionStatus) {
        self.update(|snapshot| {
            if snapshot.status == status {
                return false;
            }
            snapshot.status = status;
            true
        });
    }

    /// Update the paired host, notifying observers if it changed
    pub fn set_endpoint(&self, endpoint: Option<String>) {
        self.update(|snapshot| {
            if snapshot.endpoint == endpoint {
                return false;
            }
            snapshot.endpoint = endpoint;
            true
        });
    }

    /// Register an observer. It sees every change made after this call.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&ConnectionSnapshot) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = ObserverId(registry.next_id);
        registry.next_id += 1;
        registry.observers.push((id, Arc::new(observer)));
        id
    }

    /// Remove an observer; returns false if the token was unknown
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut registry = self.registry();
        let before = registry.observers.len();
        registry.observers.retain(|(observer_id, _)| *observer_id != id);
        registry.observers.len() != before
    }

    /// Subscribe through a channel, for async consumers
    pub fn subscribe_channel(&self) -> (ObserverId, mpsc::UnboundedReceiver<ConnectionSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |snapshot| {
            let _ = tx.send(snapshot.clone());
        });
        (id, rx)
    }

    fn update(&self, apply: impl FnOnce(&mut ConnectionSnapshot) -> bool) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let (snapshot, observers) = {
            let mut registry = self.registry();
            if !apply(&mut registry.snapshot) {
                return;
            }
            let observers: Vec<Observer> = registry
                .observers
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect();
            (registry.snapshot.clone(), observers)
        };

        trace!(
            "Connection state -> {} ({:?}), notifying {} observers",
            snapshot.status,
            snapshot.endpoint,
            observers.len()
        );

        for observer in observers {
            observer(&snapshot);
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
