//! Mock connector for testing.
//!
//! Records every open attempt and lets a test drive each session's events
//! by hand.

use super::{
    CloseInitiator, Connector, Endpoint, Result, SessionEvents, SessionHandle, SessionId,
    TransportError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded open attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAttempt {
    pub session: SessionId,
    pub endpoint: Endpoint,
}

/// Mock connector for testing.
///
/// Clones share state, so a test can keep one clone while the supervisor
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<MockConnectorInner>>,
}

#[derive(Default)]
struct MockConnectorInner {
    attempts: Vec<OpenAttempt>,
    sessions: HashMap<SessionId, MockSession>,
    close_requests: Vec<(SessionId, u16, String)>,
    sent: Vec<(SessionId, String)>,
    live: usize,
    max_live: usize,
}

impl std::fmt::Debug for MockConnectorInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnectorInner")
            .field("attempts", &self.attempts)
            .field("live", &self.live)
            .finish()
    }
}

struct MockSession {
    events: Option<SessionEvents>,
    opened: bool,
    live: bool,
}

impl MockConnectorInner {
    fn retire(&mut self, session: SessionId) {
        if let Some(entry) = self.sessions.get_mut(&session) {
            if entry.live {
                entry.live = false;
                self.live -= 1;
            }
        }
    }
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// All open attempts, in order
    pub fn attempts(&self) -> Vec<OpenAttempt> {
        self.lock().attempts.clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.lock().attempts.len()
    }

    pub fn last_session(&self) -> Option<SessionId> {
        self.lock().attempts.last().map(|attempt| attempt.session)
    }

    /// Close requests made through session handles
    pub fn close_requests(&self) -> Vec<(SessionId, u16, String)> {
        self.lock().close_requests.clone()
    }

    /// Payloads written through session handles
    pub fn sent(&self) -> Vec<(SessionId, String)> {
        self.lock().sent.clone()
    }

    /// Sessions created and not yet closed or terminated
    pub fn live_sessions(&self) -> usize {
        self.lock().live
    }

    /// High-water mark of [`Self::live_sessions`]
    pub fn max_live_sessions(&self) -> usize {
        self.lock().max_live
    }

    pub fn emit_open(&self, session: SessionId) {
        let mut inner = self.lock();
        if let Some(entry) = inner.sessions.get_mut(&session) {
            if let Some(events) = entry.events.as_mut() {
                events.opened();
                entry.opened = true;
            }
        }
    }

    pub fn emit_message(&self, session: SessionId, payload: &str) {
        self.with_events(session, |events| events.message(payload.to_string()));
    }

    pub fn emit_closed(&self, session: SessionId, code: u16, reason: &str, initiator: CloseInitiator) {
        if let Some(events) = self.take_events(session) {
            events.closed(code, reason, initiator);
        }
    }

    pub fn emit_failed(&self, session: SessionId, error: TransportError) {
        if let Some(events) = self.take_events(session) {
            events.failed(error);
        }
    }

    fn with_events(&self, session: SessionId, f: impl FnOnce(&mut SessionEvents)) {
        let mut inner = self.lock();
        if let Some(events) = inner
            .sessions
            .get_mut(&session)
            .and_then(|entry| entry.events.as_mut())
        {
            f(events);
        }
    }

    fn take_events(&self, session: SessionId) -> Option<SessionEvents> {
        let mut inner = self.lock();
        let events = inner.sessions.get_mut(&session)?.events.take();
        inner.retire(session);
        events
    }

    fn lock(&self) -> MutexGuard<'_, MockConnectorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MockConnector {
    fn open(&self, endpoint: &Endpoint, events: SessionEvents) -> Box<dyn SessionHandle> {
        let session = events.session();
        let mut inner = self.lock();

        inner.attempts.push(OpenAttempt {
            session,
            endpoint: endpoint.clone(),
        });
        inner.sessions.insert(
            session,
            MockSession {
                events: Some(events),
                opened: false,
                live: true,
            },
        );
        inner.live += 1;
        inner.max_live = inner.max_live.max(inner.live);

        Box::new(MockSessionHandle {
            session,
            inner: Arc::clone(&self.inner),
        })
    }
}

struct MockSessionHandle {
    session: SessionId,
    inner: Arc<Mutex<MockConnectorInner>>,
}

impl MockSessionHandle {
    fn lock(&self) -> MutexGuard<'_, MockConnectorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionHandle for MockSessionHandle {
    fn id(&self) -> SessionId {
        self.session
    }

    fn is_open(&self) -> bool {
        self.lock()
            .sessions
            .get(&self.session)
            .map(|entry| entry.opened && entry.events.is_some())
            .unwrap_or(false)
    }

    async fn send(&self, payload: String) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::send(format!("{} is not open", self.session)));
        }
        self.lock().sent.push((self.session, payload));
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        let mut inner = self.lock();
        inner
            .close_requests
            .push((self.session, code, reason.to_string()));
        inner.retire(self.session);
    }

    async fn closed(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{SessionEnvelope, SessionEvent};
    use tokio::sync::mpsc;

    fn open(connector: &MockConnector, id: u64) -> (Box<dyn SessionHandle>, mpsc::UnboundedReceiver<SessionEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = connector.open(
            &Endpoint::new("10.0.0.1", 8081),
            SessionEvents::new(SessionId(id), tx),
        );
        (handle, rx)
    }

    #[tokio::test]
    async fn mock_connector_records_attempts_and_events() {
        let connector = MockConnector::new();
        let (handle, mut rx) = open(&connector, 1);

        assert_eq!(connector.attempt_count(), 1);
        assert_eq!(connector.live_sessions(), 1);
        assert!(!handle.is_open());

        connector.emit_open(SessionId(1));
        connector.emit_message(SessionId(1), "hello");
        assert!(handle.is_open());
        handle.send("out".to_string()).await.unwrap();

        connector.emit_closed(SessionId(1), 1006, "gone", CloseInitiator::Remote);
        assert_eq!(connector.live_sessions(), 0);

        assert_eq!(rx.recv().await.unwrap().event, SessionEvent::Opened);
        assert_eq!(
            rx.recv().await.unwrap().event,
            SessionEvent::Message("hello".to_string())
        );
        assert!(rx.recv().await.unwrap().event.is_terminal());
        assert_eq!(connector.sent(), vec![(SessionId(1), "out".to_string())]);
    }

    #[tokio::test]
    async fn mock_connector_tracks_close_requests() {
        let connector = MockConnector::new();
        let (first, _rx1) = open(&connector, 1);
        connector.emit_open(SessionId(1));
        assert!(first.is_open());

        first.close(1001, "superseded");
        let (_second, _rx2) = open(&connector, 2);

        assert_eq!(connector.live_sessions(), 1);
        assert_eq!(connector.max_live_sessions(), 1);
        assert_eq!(
            connector.close_requests(),
            vec![(SessionId(1), 1001, "superseded".to_string())]
        );
    }
}
