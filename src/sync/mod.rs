//! Client runtime: a single task owning the reconnect supervisor
//!
//! [`ClipboardClient`] is a cheap handle over that task. Commands, session
//! events and the retry timer are all multiplexed in one `select!` loop, so
//! the supervisor never sees two inputs at once.

pub mod supervisor;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

pub use supervisor::{PendingRetry, Supervisor, SupervisorState, SHUTDOWN_GRACE};

use crate::clipboard::{ClipboardProvider, ClipboardSink};
use crate::config::{Config, ConfigError};
use crate::state::ConnectionState;
use crate::store::EndpointStore;
use crate::transport::{Backoff, Connector, SessionEnvelope, TransportError};
use crate::{Error, Result};

const COMMAND_BUFFER: usize = 32;

enum Command {
    Connect {
        host: Option<String>,
        reply: oneshot::Sender<std::result::Result<(), ConfigError>>,
    },
    SetEndpoint {
        host: Option<String>,
        reply: oneshot::Sender<()>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        payload: String,
        reply: oneshot::Sender<std::result::Result<(), TransportError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running clipboard client
pub struct ClipboardClient {
    commands: mpsc::Sender<Command>,
    state: Arc<ConnectionState>,
    auto_connect: bool,
    task: JoinHandle<()>,
}

impl ClipboardClient {
    /// Spawn the client task. Must be called inside a Tokio runtime.
    ///
    /// Nothing connects until [`connect`](Self::connect) or
    /// [`resume`](Self::resume) is called.
    pub fn start(
        config: &Config,
        state: Arc<ConnectionState>,
        connector: Arc<dyn Connector>,
        clipboard: Arc<dyn ClipboardProvider>,
    ) -> Self {
        let sink = ClipboardSink::new(clipboard, config.clipboard.max_size);
        let backoff = Backoff::new(config.reconnection_config());
        let (supervisor, events) = Supervisor::new(
            Arc::clone(&state),
            connector,
            sink,
            backoff,
            config.connection.port,
        );

        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(run(supervisor, command_rx, events));

        Self {
            commands,
            state,
            auto_connect: config.connection.auto_connect,
            task,
        }
    }

    /// Observable connection state
    pub fn state(&self) -> &Arc<ConnectionState> {
        &self.state
    }

    /// Connect to `host`, replacing any current session.
    ///
    /// `None` or a blank host leaves the client in the error state and
    /// returns [`ConfigError::MissingEndpoint`].
    pub async fn connect(&self, host: Option<&str>) -> Result<()> {
        let host = host.map(str::to_string);
        self.request(|reply| Command::Connect { host, reply })
            .await?
            .map_err(Error::from)
    }

    /// Update the paired host. A live or pending connection to the old host
    /// is replaced; clearing the host disconnects.
    pub async fn set_endpoint(&self, host: Option<&str>) -> Result<()> {
        let host = host.map(str::to_string);
        self.request(|reply| Command::SetEndpoint { host, reply })
            .await
    }

    /// Close the session and cancel any pending retry
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Send a text payload to the paired computer
    pub async fn send(&self, payload: impl Into<String>) -> Result<()> {
        let payload = payload.into();
        self.request(|reply| Command::Send { payload, reply })
            .await?
            .map_err(Error::from)
    }

    /// Seed the endpoint from `store`, connecting if auto-connect is enabled.
    /// Returns the stored host.
    pub async fn resume(&self, store: &dyn EndpointStore) -> Result<Option<String>> {
        let host = store.load()?;

        match host.as_deref() {
            Some(host) if self.auto_connect => {
                info!("Resuming connection to {}", host);
                self.connect(Some(host)).await?;
            }
            Some(host) => {
                debug!("Auto-connect disabled, recording {}", host);
                self.set_endpoint(Some(host)).await?;
            }
            None => debug!("No stored paired host"),
        }

        Ok(host)
    }

    /// Cancel timers, close the session with a normal code and wait for the
    /// client task to finish. The close frame is flushed before this returns,
    /// unless the session takes longer than [`SHUTDOWN_GRACE`].
    pub async fn shutdown(self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = done.await;
        }
        self.task
            .await
            .map_err(|e| Error::Other(format!("client task failed: {e}")))
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::ClientStopped)?;
        response.await.map_err(|_| Error::ClientStopped)
    }
}

async fn run(
    mut supervisor: Supervisor,
    mut commands: mpsc::Receiver<Command>,
    mut events: mpsc::UnboundedReceiver<SessionEnvelope>,
) {
    debug!("Client task started");

    loop {
        let retry_due = supervisor.retry_deadline();

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Connect { host, reply }) => {
                    let _ = reply.send(supervisor.connect(host));
                }
                Some(Command::SetEndpoint { host, reply }) => {
                    supervisor.set_endpoint(host);
                    let _ = reply.send(());
                }
                Some(Command::Disconnect { reply }) => {
                    supervisor.disconnect();
                    let _ = reply.send(());
                }
                Some(Command::Send { payload, reply }) => {
                    let _ = reply.send(supervisor.send(payload).await);
                }
                Some(Command::Shutdown { reply }) => {
                    supervisor.shutdown().await;
                    let _ = reply.send(());
                    break;
                }
                // Every handle is gone
                None => {
                    supervisor.shutdown().await;
                    break;
                }
            },

            Some(envelope) = events.recv() => supervisor.handle_event(envelope).await,

            () = retry_timer(retry_due) => supervisor.fire_retry(),
        }
    }

    debug!("Client task stopped");
}

fn retry_timer(due: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match due {
            Some(due) => tokio::time::sleep_until(due).await,
            None => std::future::pending().await,
        }
    }
}
