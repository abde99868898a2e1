//! WebSocket session implementation for ClipSync
//!
//! Each session runs in its own task: it opens the socket, forwards inbound
//! text frames as clipboard payloads, writes queued outbound payloads, and
//! sends a ping every keep-alive interval. A ping still unanswered when the
//! next one is due fails the session.

use crate::transport::{
    CloseInitiator, Connector, Endpoint, Result, SessionEvents, SessionHandle, SessionId,
    TransportError, CLOSE_NORMAL,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, instrument, warn};

/// Close code reported when the peer sent a close frame without a status
const CLOSE_NO_STATUS: u16 = 1005;

/// WebSocket session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketConfig {
    /// Connection timeout
    pub connect_timeout: Duration,

    /// Keep-alive interval
    pub keepalive_interval: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

/// Opens plain `ws://` sessions to the paired computer
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, endpoint: &Endpoint, events: SessionEvents) -> Box<dyn SessionHandle> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let id = events.session();

        let task = tokio::spawn(run_session(
            endpoint.url(),
            self.config.clone(),
            events,
            command_rx,
            Arc::clone(&open),
        ));

        Box::new(WebSocketSession {
            id,
            commands: command_tx,
            open,
            task: Mutex::new(Some(task)),
        })
    }
}

enum SessionCommand {
    Send(String),
    Close { code: u16, reason: String },
}

enum Outcome {
    Closed {
        code: u16,
        reason: String,
        initiator: CloseInitiator,
    },
    Failed(TransportError),
}

/// Supervisor-side handle of a websocket session
struct WebSocketSession {
    id: SessionId,
    commands: mpsc::UnboundedSender<SessionCommand>,
    open: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl SessionHandle for WebSocketSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send(&self, payload: String) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::send(format!("{} is not open", self.id)));
        }

        self.commands
            .send(SessionCommand::Send(payload))
            .map_err(|_| TransportError::send(format!("{} has terminated", self.id)))
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self.commands.send(SessionCommand::Close {
            code,
            reason: reason.to_string(),
        });
    }

    async fn closed(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("{} task ended abnormally: {}", self.id, e);
            }
        }
    }
}

#[instrument(skip_all, fields(session = %events.session(), url = %url))]
async fn run_session(
    url: String,
    config: WebSocketConfig,
    mut events: SessionEvents,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    open: Arc<AtomicBool>,
) {
    debug!("Opening websocket");

    let connect = tokio::time::timeout(config.connect_timeout, connect_async(url.as_str()));
    tokio::pin!(connect);

    let ws_stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok(Ok((ws_stream, _response))) => break ws_stream,
                Ok(Err(e)) => {
                    events.failed(TransportError::connect(e.to_string()));
                    return;
                }
                Err(_) => {
                    events.failed(TransportError::Timeout {
                        secs: config.connect_timeout.as_secs(),
                    });
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(SessionCommand::Send(_)) => {
                    warn!("Dropping payload queued before the session opened");
                }
                Some(SessionCommand::Close { code, reason }) => {
                    debug!("Close requested before open: {} {}", code, reason);
                    events.closed(code, reason, CloseInitiator::Local);
                    return;
                }
                None => {
                    events.closed(CLOSE_NORMAL, "session handle dropped", CloseInitiator::Local);
                    return;
                }
            },
        }
    };

    info!("WebSocket connection established");
    open.store(true, Ordering::SeqCst);
    events.opened();

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    let mut keepalive = tokio::time::interval_at(
        Instant::now() + config.keepalive_interval,
        config.keepalive_interval,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut awaiting_pong = false;

    let outcome = loop {
        tokio::select! {
            frame = ws_stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    debug!("Received {} byte text message", text.len());
                    events.message(text.as_str().to_owned());
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    warn!("Ignoring unexpected binary message of {} bytes", data.len());
                }
                Some(Ok(WsMessage::Ping(_))) => {
                    // Pong is handled automatically by tokio-tungstenite
                }
                Some(Ok(WsMessage::Pong(_))) => {
                    awaiting_pong = false;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    info!("WebSocket connection closed by peer: {} {}", code, reason);
                    let _ = ws_sink.close().await;
                    break Outcome::Closed { code, reason, initiator: CloseInitiator::Remote };
                }
                Some(Ok(WsMessage::Frame(_))) => {
                    warn!("Received unexpected raw frame");
                }
                Some(Err(e)) => {
                    break Outcome::Failed(TransportError::failure(e.to_string()));
                }
                None => {
                    break Outcome::Failed(TransportError::failure("stream ended without a close frame"));
                }
            },

            command = commands.recv() => match command {
                Some(SessionCommand::Send(payload)) => {
                    if let Err(e) = ws_sink.send(WsMessage::Text(payload.into())).await {
                        break Outcome::Failed(TransportError::failure(e.to_string()));
                    }
                }
                Some(SessionCommand::Close { code, reason }) => {
                    send_close(&mut ws_sink, code, &reason).await;
                    break Outcome::Closed { code, reason, initiator: CloseInitiator::Local };
                }
                None => {
                    let reason = "session handle dropped".to_string();
                    send_close(&mut ws_sink, CLOSE_NORMAL, &reason).await;
                    break Outcome::Closed { code: CLOSE_NORMAL, reason, initiator: CloseInitiator::Local };
                }
            },

            _ = keepalive.tick() => {
                if awaiting_pong {
                    warn!("No pong within {:?}", config.keepalive_interval);
                    break Outcome::Failed(TransportError::KeepAliveTimeout {
                        secs: config.keepalive_interval.as_secs(),
                    });
                }
                if let Err(e) = ws_sink.send(WsMessage::Ping(Default::default())).await {
                    break Outcome::Failed(TransportError::failure(e.to_string()));
                }
                awaiting_pong = true;
            }
        }
    };

    open.store(false, Ordering::SeqCst);

    match outcome {
        Outcome::Closed {
            code,
            reason,
            initiator,
        } => events.closed(code, reason, initiator),
        Outcome::Failed(error) => {
            warn!("WebSocket session failed: {}", error);
            events.failed(error);
        }
    }
}

async fn send_close<S>(ws_sink: &mut S, code: u16, reason: &str)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_string().into(),
    };
    if ws_sink.send(WsMessage::Close(Some(frame))).await.is_err() {
        debug!("Close frame could not be delivered");
    }
}
