//! Reconnect supervisor state machine
//!
//! The supervisor owns at most one live session and at most one pending
//! retry. It is driven from a single task (see [`super::ClipboardClient`]),
//! so commands, session events and retry firings are never processed
//! concurrently. Events are tagged with a [`SessionId`] and anything from a
//! session other than the current one is discarded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clipboard::ClipboardSink;
use crate::config::ConfigError;
use crate::state::{ConnectionState, ConnectionStatus};
use crate::transport::{
    Backoff, CloseInitiator, Connector, Endpoint, SessionEnvelope, SessionEvent, SessionEvents,
    SessionHandle, SessionId, TransportError, CLOSE_GOING_AWAY, CLOSE_NORMAL,
};

/// How long shutdown waits for the live session to finish closing
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Internal supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No session, no pending retry
    Idle,
    Connecting,
    Connected,
    /// Closed unexpectedly; a retry is pending
    RetryWait,
    /// Failed, or no endpoint; a retry may be pending
    Error,
}

impl SupervisorState {
    /// Externally visible status for this state
    pub fn status(self) -> ConnectionStatus {
        match self {
            SupervisorState::Idle | SupervisorState::RetryWait => ConnectionStatus::Disconnected,
            SupervisorState::Connecting => ConnectionStatus::Connecting,
            SupervisorState::Connected => ConnectionStatus::Connected,
            SupervisorState::Error => ConnectionStatus::Error,
        }
    }
}

/// The single scheduled retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRetry {
    pub due: Instant,
    pub delay: Duration,
}

pub struct Supervisor {
    state: SupervisorState,
    shared: Arc<ConnectionState>,
    connector: Arc<dyn Connector>,
    sink: ClipboardSink,
    backoff: Backoff,
    port: u16,
    events_tx: mpsc::UnboundedSender<SessionEnvelope>,
    session: Option<Box<dyn SessionHandle>>,
    pending_retry: Option<PendingRetry>,
    next_session: u64,
}

impl Supervisor {
    /// Create a supervisor and the receiver its sessions report into
    pub fn new(
        shared: Arc<ConnectionState>,
        connector: Arc<dyn Connector>,
        sink: ClipboardSink,
        backoff: Backoff,
        port: u16,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEnvelope>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let supervisor = Self {
            state: SupervisorState::Idle,
            shared,
            connector,
            sink,
            backoff,
            port,
            events_tx,
            session: None,
            pending_retry: None,
            next_session: 1,
        };

        (supervisor, events_rx)
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn pending_retry(&self) -> Option<PendingRetry> {
        self.pending_retry
    }

    pub fn retry_deadline(&self) -> Option<Instant> {
        self.pending_retry.map(|retry| retry.due)
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.session.as_ref().map(|session| session.id())
    }

    /// Explicit connect request. An absent or blank host puts the supervisor
    /// in `Error` without opening anything.
    pub fn connect(&mut self, host: Option<String>) -> Result<(), ConfigError> {
        self.backoff.reset();
        self.start_attempt(normalize(host))
    }

    /// Cancel any retry, close any session, and go idle
    pub fn disconnect(&mut self) {
        self.cancel_retry();
        self.teardown_session(CLOSE_NORMAL, "disconnect requested");
        self.backoff.reset();
        self.transition(SupervisorState::Idle);
    }

    /// Change the paired host. An active link to the old host is replaced.
    pub fn set_endpoint(&mut self, host: Option<String>) {
        let host = normalize(host);
        if host == self.shared.endpoint() {
            return;
        }

        let active = self.session.is_some() || self.pending_retry.is_some();
        match (active, host) {
            (true, Some(host)) => {
                info!("Paired host changed to {}, reconnecting", host);
                self.backoff.reset();
                // A present host cannot fail validation.
                let _ = self.start_attempt(Some(host));
            }
            (true, None) => {
                info!("Paired host cleared, disconnecting");
                self.cancel_retry();
                self.teardown_session(CLOSE_GOING_AWAY, "endpoint cleared");
                self.shared.set_endpoint(None);
                self.transition(SupervisorState::Idle);
            }
            (false, host) => self.shared.set_endpoint(host),
        }
    }

    /// Send a payload over the open session
    pub async fn send(&self, payload: String) -> Result<(), TransportError> {
        match &self.session {
            Some(session) if self.state == SupervisorState::Connected => {
                session.send(payload).await
            }
            _ => Err(TransportError::send("not connected to the paired computer")),
        }
    }

    /// Process one event from a session
    pub async fn handle_event(&mut self, envelope: SessionEnvelope) {
        let SessionEnvelope { session, event } = envelope;

        if self.current_session() != Some(session) {
            debug!("Discarding {:?} from stale {}", event, session);
            return;
        }

        match event {
            SessionEvent::Opened => {
                if self.state != SupervisorState::Connecting {
                    debug!("Ignoring open of {} in state {:?}", session, self.state);
                    return;
                }
                info!("Connected to {:?} ({})", self.shared.endpoint(), session);
                self.cancel_retry();
                self.backoff.reset();
                self.transition(SupervisorState::Connected);
            }

            SessionEvent::Message(payload) => {
                if self.state != SupervisorState::Connected {
                    debug!("Ignoring message on {} in state {:?}", session, self.state);
                    return;
                }
                let outcome = self.sink.apply(&payload).await;
                debug!("Inbound update on {}: {:?}", session, outcome);
            }

            SessionEvent::Closed {
                code,
                reason,
                initiator,
            } => {
                self.session = None;
                let orderly = initiator == CloseInitiator::Local
                    && (code == CLOSE_NORMAL || code == CLOSE_GOING_AWAY);

                if orderly {
                    info!("{} closed locally: {} {}", session, code, reason);
                    self.cancel_retry();
                    self.transition(SupervisorState::Idle);
                } else {
                    info!("{} closed by {:?}: {} {}", session, initiator, code, reason);
                    if self.schedule_retry() {
                        self.transition(SupervisorState::RetryWait);
                    } else {
                        self.transition(SupervisorState::Error);
                    }
                }
            }

            SessionEvent::Failed(error) => {
                self.session = None;
                warn!("{} failed: {}", session, error);
                self.transition(SupervisorState::Error);
                self.schedule_retry();
            }
        }
    }

    /// The pending retry is due
    pub fn fire_retry(&mut self) {
        if self.pending_retry.take().is_none() {
            return;
        }

        match self.shared.endpoint() {
            Some(host) => {
                info!(
                    "Retrying connection to {} (attempt {})",
                    host,
                    self.backoff.attempt_count()
                );
                // A present host cannot fail validation.
                let _ = self.start_attempt(Some(host));
            }
            None => {
                debug!("Paired host cleared while waiting; not retrying");
                self.transition(SupervisorState::Idle);
            }
        }
    }

    /// Cancel timers, close the live session with a normal code and wait
    /// up to [`SHUTDOWN_GRACE`] for its transport to finish
    pub async fn shutdown(&mut self) {
        self.cancel_retry();
        if let Some(session) = self.session.take() {
            let id = session.id();
            debug!("Closing {}: {} client shutting down", id, CLOSE_NORMAL);
            session.close(CLOSE_NORMAL, "client shutting down");
            if tokio::time::timeout(SHUTDOWN_GRACE, session.closed())
                .await
                .is_err()
            {
                warn!("{} did not close within {:?}", id, SHUTDOWN_GRACE);
            }
        }
        self.transition(SupervisorState::Idle);
    }

    fn start_attempt(&mut self, host: Option<String>) -> Result<(), ConfigError> {
        self.cancel_retry();
        self.teardown_session(CLOSE_GOING_AWAY, "superseded");
        self.shared.set_endpoint(host.clone());

        let Some(host) = host else {
            warn!("Connection failed, no paired host set");
            self.transition(SupervisorState::Error);
            return Err(ConfigError::MissingEndpoint);
        };

        let id = SessionId(self.next_session);
        self.next_session += 1;

        let endpoint = Endpoint::new(host, self.port);
        info!("Attempting to connect to {} ({})", endpoint.url(), id);
        self.transition(SupervisorState::Connecting);

        let events = SessionEvents::new(id, self.events_tx.clone());
        self.session = Some(self.connector.open(&endpoint, events));
        Ok(())
    }

    /// Schedule the next retry, replacing any pending one. Returns false
    /// once the retry budget is exhausted.
    fn schedule_retry(&mut self) -> bool {
        if self.pending_retry.take().is_some() {
            debug!("Replacing pending retry");
        }

        match self.backoff.next_delay() {
            Some(delay) => {
                info!("Reconnecting in {:?}", delay);
                self.pending_retry = Some(PendingRetry {
                    due: Instant::now() + delay,
                    delay,
                });
                true
            }
            None => {
                warn!(
                    "Giving up after {} reconnection attempts",
                    self.backoff.attempt_count()
                );
                false
            }
        }
    }

    fn cancel_retry(&mut self) {
        if self.pending_retry.take().is_some() {
            debug!("Cancelled pending retry");
        }
    }

    fn teardown_session(&mut self, code: u16, reason: &str) {
        if let Some(session) = self.session.take() {
            debug!("Closing {}: {} {}", session.id(), code, reason);
            session.close(code, reason);
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        if self.state != next {
            debug!("Supervisor {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        self.shared.set_status(next.status());
    }
}

fn normalize(host: Option<String>) -> Option<String> {
    host.map(|h| h.trim().to_string()).filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::{MemoryClipboard, MAX_CLIPBOARD_SIZE};
    use crate::transport::{MockConnector, ReconnectionConfig};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    struct Harness {
        supervisor: Supervisor,
        events: mpsc::UnboundedReceiver<SessionEnvelope>,
        connector: MockConnector,
        clipboard: MemoryClipboard,
        shared: Arc<ConnectionState>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_policy(ReconnectionConfig::default())
        }

        fn with_policy(policy: ReconnectionConfig) -> Self {
            let shared = Arc::new(ConnectionState::new());
            let connector = MockConnector::new();
            let clipboard = MemoryClipboard::new();
            let sink = ClipboardSink::new(Arc::new(clipboard.clone()), MAX_CLIPBOARD_SIZE);
            let (supervisor, events) = Supervisor::new(
                Arc::clone(&shared),
                Arc::new(connector.clone()),
                sink,
                Backoff::new(policy),
                8081,
            );
            Self {
                supervisor,
                events,
                connector,
                clipboard,
                shared,
            }
        }

        /// Deliver every queued session event to the supervisor
        async fn pump(&mut self) {
            while let Ok(envelope) = self.events.try_recv() {
                self.supervisor.handle_event(envelope).await;
            }
        }

        fn session(&self) -> SessionId {
            self.supervisor.current_session().expect("live session")
        }

        fn status(&self) -> ConnectionStatus {
            self.shared.status()
        }
    }

    #[tokio::test]
    async fn connect_without_endpoint_is_error_and_opens_nothing() {
        let mut h = Harness::new();

        let result = h.supervisor.connect(None);
        assert!(matches!(result, Err(ConfigError::MissingEndpoint)));
        assert_eq!(h.supervisor.state(), SupervisorState::Error);
        assert_eq!(h.status(), ConnectionStatus::Error);
        assert_eq!(h.connector.attempt_count(), 0);
        assert!(h.supervisor.pending_retry().is_none());

        assert!(h.supervisor.connect(Some("   ".to_string())).is_err());
        assert_eq!(h.connector.attempt_count(), 0);
    }

    #[tokio::test]
    async fn connect_then_open_reaches_connected() {
        let mut h = Harness::new();

        h.supervisor.connect(Some("192.168.1.20".to_string())).unwrap();
        assert_eq!(h.status(), ConnectionStatus::Connecting);
        assert_eq!(h.shared.endpoint(), Some("192.168.1.20".to_string()));

        let attempts = h.connector.attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].endpoint, Endpoint::new("192.168.1.20", 8081));

        h.connector.emit_open(h.session());
        h.pump().await;
        assert_eq!(h.supervisor.state(), SupervisorState::Connected);
        assert_eq!(h.status(), ConnectionStatus::Connected);
        assert!(h.supervisor.pending_retry().is_none());
    }

    #[tokio::test]
    async fn repeated_payload_is_written_once() {
        let mut h = Harness::new();
        h.supervisor.connect(Some("10.0.0.2".to_string())).unwrap();
        let session = h.session();

        h.connector.emit_open(session);
        h.connector.emit_message(session, "hello");
        h.connector.emit_message(session, "hello");
        h.pump().await;

        assert_eq!(h.clipboard.write_count(), 1);
        assert_eq!(h.clipboard.text(), Some("hello".to_string()));
        assert_eq!(h.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_retry_success_round_trip() {
        let mut h = Harness::new();
        h.supervisor.connect(Some("10.0.0.2".to_string())).unwrap();

        h.connector
            .emit_failed(h.session(), TransportError::connect("connection refused"));
        h.pump().await;

        assert_eq!(h.status(), ConnectionStatus::Error);
        let retry = h.supervisor.pending_retry().expect("retry scheduled");
        assert_eq!(retry.delay, Duration::from_secs(5));
        assert_eq!(retry.due - Instant::now(), Duration::from_secs(5));
        assert!(h.supervisor.current_session().is_none());

        h.supervisor.fire_retry();
        assert_eq!(h.status(), ConnectionStatus::Connecting);
        assert_eq!(h.connector.attempt_count(), 2);

        h.connector.emit_open(h.session());
        h.pump().await;
        assert_eq!(h.status(), ConnectionStatus::Connected);
        assert!(h.supervisor.pending_retry().is_none());
    }

    #[tokio::test]
    async fn unexpected_close_waits_for_retry() {
        let mut h = Harness::new();
        h.supervisor.connect(Some("10.0.0.2".to_string())).unwrap();
        let session = h.session();
        h.connector.emit_open(session);
        h.connector
            .emit_closed(session, 1001, "server restarting", CloseInitiator::Remote);
        h.pump().await;

        assert_eq!(h.supervisor.state(), SupervisorState::RetryWait);
        assert_eq!(h.status(), ConnectionStatus::Disconnected);
        assert!(h.supervisor.pending_retry().is_some());
    }

    #[tokio::test]
    async fn orderly_local_close_goes_idle_without_retry() {
        let mut h = Harness::new();
        h.supervisor.connect(Some("10.0.0.2".to_string())).unwrap();
        let session = h.session();
        h.connector.emit_open(session);
        h.connector
            .emit_closed(session, CLOSE_NORMAL, "bye", CloseInitiator::Local);
        h.pump().await;

        assert_eq!(h.supervisor.state(), SupervisorState::Idle);
        assert!(h.supervisor.pending_retry().is_none());
    }

    #[tokio::test]
    async fn superseded_session_events_are_ignored() {
        let mut h = Harness::new();
        h.supervisor.connect(Some("10.0.0.1".to_string())).unwrap();
        let first = h.session();
        h.supervisor.connect(Some("10.0.0.2".to_string())).unwrap();
        let second = h.session();
        assert_ne!(first, second);

        h.connector.emit_open(first);
        h.connector.emit_message(first, "stale");
        h.connector
            .emit_failed(first, TransportError::failure("reset by peer"));
        h.pump().await;

        assert_eq!(h.supervisor.state(), SupervisorState::Connecting);
        assert_eq!(h.supervisor.current_session(), Some(second));
        assert!(h.supervisor.pending_retry().is_none());
        assert_eq!(h.clipboard.write_count(), 0);
        assert_eq!(
            h.connector.close_requests(),
            vec![(first, CLOSE_GOING_AWAY, "superseded".to_string())]
        );
        assert_eq!(h.connector.max_live_sessions(), 1);
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_retry() {
        let mut h = Harness::new();
        h.supervisor.connect(Some("10.0.0.2".to_string())).unwrap();
        h.connector
            .emit_closed(h.session(), 1006, "", CloseInitiator::Remote);
        h.pump().await;
        assert!(h.supervisor.pending_retry().is_some());

        h.supervisor.disconnect();
        assert!(h.supervisor.pending_retry().is_none());
        assert_eq!(h.supervisor.state(), SupervisorState::Idle);

        h.supervisor.fire_retry();
        assert_eq!(h.connector.attempt_count(), 1);
    }

    #[tokio::test]
    async fn retry_with_cleared_endpoint_goes_idle() {
        let mut h = Harness::new();
        h.supervisor.connect(Some("10.0.0.2".to_string())).unwrap();
        h.connector
            .emit_failed(h.session(), TransportError::connect("unreachable"));
        h.pump().await;

        h.shared.set_endpoint(None);
        h.supervisor.fire_retry();

        assert_eq!(h.supervisor.state(), SupervisorState::Idle);
        assert_eq!(h.status(), ConnectionStatus::Disconnected);
        assert_eq!(h.connector.attempt_count(), 1);
    }

    #[tokio::test]
    async fn endpoint_change_replaces_live_session() {
        let mut h = Harness::new();
        h.supervisor.connect(Some("10.0.0.1".to_string())).unwrap();
        let first = h.session();
        h.connector.emit_open(first);
        h.pump().await;

        h.supervisor.set_endpoint(Some("10.0.0.9".to_string()));
        assert_eq!(h.status(), ConnectionStatus::Connecting);
        assert_eq!(h.connector.attempts()[1].endpoint.host, "10.0.0.9");
        assert_eq!(h.connector.live_sessions(), 1);

        h.supervisor.set_endpoint(None);
        assert_eq!(h.supervisor.state(), SupervisorState::Idle);
        assert_eq!(h.connector.live_sessions(), 0);
        assert!(h.shared.endpoint().is_none());
    }

    #[tokio::test]
    async fn endpoint_change_while_idle_only_records_host() {
        let mut h = Harness::new();
        h.supervisor.set_endpoint(Some("desk.local".to_string()));

        assert_eq!(h.shared.endpoint(), Some("desk.local".to_string()));
        assert_eq!(h.supervisor.state(), SupervisorState::Idle);
        assert_eq!(h.connector.attempt_count(), 0);
    }

    #[tokio::test]
    async fn send_requires_open_session() {
        let mut h = Harness::new();
        let err = h.supervisor.send("early".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::Send { .. }));

        h.supervisor.connect(Some("10.0.0.2".to_string())).unwrap();
        let session = h.session();
        h.connector.emit_open(session);
        h.pump().await;

        h.supervisor.send("outbound".to_string()).await.unwrap();
        assert_eq!(h.connector.sent(), vec![(session, "outbound".to_string())]);
    }

    #[tokio::test]
    async fn exhausted_retry_budget_stays_in_error() {
        let mut h = Harness::with_policy(ReconnectionConfig {
            max_attempts: 1,
            ..ReconnectionConfig::default()
        });
        h.supervisor.connect(Some("10.0.0.2".to_string())).unwrap();
        h.connector
            .emit_failed(h.session(), TransportError::connect("refused"));
        h.pump().await;
        assert!(h.supervisor.pending_retry().is_some());

        h.supervisor.fire_retry();
        h.connector
            .emit_closed(h.session(), 1006, "", CloseInitiator::Remote);
        h.pump().await;

        assert_eq!(h.supervisor.state(), SupervisorState::Error);
        assert!(h.supervisor.pending_retry().is_none());
    }

    #[tokio::test]
    async fn shutdown_closes_with_normal_code() {
        let mut h = Harness::new();
        h.supervisor.connect(Some("10.0.0.2".to_string())).unwrap();
        let session = h.session();
        h.supervisor.shutdown().await;

        assert_eq!(
            h.connector.close_requests(),
            vec![(session, CLOSE_NORMAL, "client shutting down".to_string())]
        );
        assert_eq!(h.status(), ConnectionStatus::Disconnected);
    }

    // Random event sequences against a reference model of the transition table

    #[derive(Debug, Clone)]
    enum Op {
        Connect(Option<u8>),
        SetEndpoint(Option<u8>),
        Disconnect,
        Open,
        Message(u8),
        CloseRemote(u16),
        CloseLocal,
        Fail,
        FireRetry,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::option::weighted(0.8, 0u8..3).prop_map(Op::Connect),
            prop::option::weighted(0.7, 0u8..3).prop_map(Op::SetEndpoint),
            Just(Op::Disconnect),
            Just(Op::Open),
            (0u8..3).prop_map(Op::Message),
            prop_oneof![Just(1000u16), Just(1001), Just(1006), Just(1011)].prop_map(Op::CloseRemote),
            Just(Op::CloseLocal),
            Just(Op::Fail),
            Just(Op::FireRetry),
        ]
    }

    #[derive(Debug, Default)]
    struct Model {
        state: Option<SupervisorState>,
        endpoint: Option<String>,
        session_opened: Option<bool>,
        retry: bool,
    }

    impl Model {
        fn state(&self) -> SupervisorState {
            self.state.unwrap_or(SupervisorState::Idle)
        }

        fn connect(&mut self, host: Option<String>) {
            self.retry = false;
            self.endpoint = host.clone();
            if host.is_some() {
                self.session_opened = Some(false);
                self.state = Some(SupervisorState::Connecting);
            } else {
                self.session_opened = None;
                self.state = Some(SupervisorState::Error);
            }
        }
    }

    fn host(n: Option<u8>) -> Option<String> {
        n.map(|n| format!("10.0.0.{n}"))
    }

    proptest! {
        #[test]
        fn transitions_follow_table(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            runtime.block_on(async {
                let mut h = Harness::new();
                let mut model = Model::default();

                for op in ops {
                    match op {
                        Op::Connect(n) => {
                            let _ = h.supervisor.connect(host(n));
                            model.connect(host(n));
                        }
                        Op::SetEndpoint(n) => {
                            let new_host = host(n);
                            h.supervisor.set_endpoint(new_host.clone());
                            if new_host != model.endpoint {
                                let active = model.session_opened.is_some() || model.retry;
                                match (active, new_host) {
                                    (true, Some(new_host)) => model.connect(Some(new_host)),
                                    (true, None) => {
                                        model.retry = false;
                                        model.session_opened = None;
                                        model.endpoint = None;
                                        model.state = Some(SupervisorState::Idle);
                                    }
                                    (false, new_host) => model.endpoint = new_host,
                                }
                            }
                        }
                        Op::Disconnect => {
                            h.supervisor.disconnect();
                            model.retry = false;
                            model.session_opened = None;
                            model.state = Some(SupervisorState::Idle);
                        }
                        Op::Open => {
                            if model.session_opened == Some(false) {
                                h.connector.emit_open(h.session());
                                h.pump().await;
                                model.session_opened = Some(true);
                                model.retry = false;
                                model.state = Some(SupervisorState::Connected);
                            }
                        }
                        Op::Message(n) => {
                            if model.session_opened == Some(true) {
                                h.connector.emit_message(h.session(), &format!("clip {n}"));
                                h.pump().await;
                            }
                        }
                        Op::CloseRemote(code) => {
                            if model.session_opened.is_some() {
                                h.connector.emit_closed(h.session(), code, "", CloseInitiator::Remote);
                                h.pump().await;
                                model.session_opened = None;
                                model.retry = true;
                                model.state = Some(SupervisorState::RetryWait);
                            }
                        }
                        Op::CloseLocal => {
                            if model.session_opened.is_some() {
                                h.connector.emit_closed(h.session(), CLOSE_NORMAL, "", CloseInitiator::Local);
                                h.pump().await;
                                model.session_opened = None;
                                model.retry = false;
                                model.state = Some(SupervisorState::Idle);
                            }
                        }
                        Op::Fail => {
                            if model.session_opened.is_some() {
                                h.connector.emit_failed(h.session(), TransportError::failure("boom"));
                                h.pump().await;
                                model.session_opened = None;
                                model.retry = true;
                                model.state = Some(SupervisorState::Error);
                            }
                        }
                        Op::FireRetry => {
                            h.supervisor.fire_retry();
                            if model.retry {
                                model.retry = false;
                                match model.endpoint.clone() {
                                    Some(endpoint) => model.connect(Some(endpoint)),
                                    None => model.state = Some(SupervisorState::Idle),
                                }
                            }
                        }
                    }

                    assert_eq!(h.supervisor.state(), model.state());
                    assert_eq!(h.status(), model.state().status());
                    assert_eq!(h.supervisor.pending_retry().is_some(), model.retry);
                    assert_eq!(h.supervisor.current_session().is_some(), model.session_opened.is_some());
                    assert_eq!(h.shared.endpoint(), model.endpoint);
                    assert!(h.connector.live_sessions() <= 1);
                }

                assert!(h.connector.max_live_sessions() <= 1);
            });
        }
    }
}
