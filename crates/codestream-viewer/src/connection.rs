use codestream_core::{CloseDecision, ConnectionStatus, ReconnectPolicy, ReconnectTracker};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

/// How long a stopping task gets to close its socket before it is aborted.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Everything the connection task reports, in socket order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Status(ConnectionStatus),
    Open,
    Message(String),
    Binary(Vec<u8>),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the single live connection task.
pub struct ConnectionManager {
    url: Url,
    policy: ReconnectPolicy,
    events: mpsc::Sender<ConnectionEvent>,
    running: Option<Running>,
}

impl ConnectionManager {
    pub fn new(url: Url, policy: ReconnectPolicy, events: mpsc::Sender<ConnectionEvent>) -> Self {
        Self {
            url,
            policy,
            events,
            running: None,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Starts a fresh connection task with a clean attempt counter. A task that
    /// is still running is stopped and joined first, so it cannot emit anything
    /// after the new task starts.
    pub async fn start(&mut self) {
        self.stop().await;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let url = self.url.clone();
        let policy = self.policy;
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            connection_loop(url, policy, events, shutdown_rx).await;
        });
        info!(event = "connection_started", url = %self.url);
        self.running = Some(Running {
            shutdown: shutdown_tx,
            task,
        });
    }

    /// Closes the socket and waits for the task to end. Returns false when
    /// nothing ran.
    pub async fn stop(&mut self) -> bool {
        let Some(Running { shutdown, mut task }) = self.running.take() else {
            return false;
        };
        let _ = shutdown.send(());
        debug!(event = "connection_stop_requested", url = %self.url);
        if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
            task.abort();
            let _ = task.await;
            warn!(event = "connection_task_aborted", url = %self.url);
        }
        true
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(());
        }
    }
}

#[derive(Debug)]
struct ReceiverGone;

enum SocketEnd {
    Shutdown,
    Closed { code: Option<u16>, reason: String },
}

async fn emit(tx: &mpsc::Sender<ConnectionEvent>, event: ConnectionEvent) -> Result<(), ReceiverGone> {
    tx.send(event).await.map_err(|_| ReceiverGone)
}

async fn connection_loop(
    url: Url,
    policy: ReconnectPolicy,
    tx: mpsc::Sender<ConnectionEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    if run_connection(&url, policy, &tx, &mut shutdown).await.is_err() {
        debug!(event = "connection_receiver_dropped", url = %url);
    }
}

async fn run_connection(
    url: &Url,
    policy: ReconnectPolicy,
    tx: &mpsc::Sender<ConnectionEvent>,
    shutdown: &mut oneshot::Receiver<()>,
) -> Result<(), ReceiverGone> {
    let mut tracker = ReconnectTracker::new(policy);
    loop {
        emit(tx, ConnectionEvent::Status(tracker.on_connecting())).await?;
        let connect = tokio::select! {
            biased;
            _ = &mut *shutdown => return Ok(()),
            result = connect_async(url.as_str()) => result,
        };
        match connect {
            Ok((ws, _response)) => {
                info!(event = "ws_connected", url = %url);
                let status = tracker.on_open();
                emit(tx, ConnectionEvent::Open).await?;
                emit(tx, ConnectionEvent::Status(status)).await?;
                match pump_socket(ws, tx, shutdown).await? {
                    SocketEnd::Shutdown => return Ok(()),
                    SocketEnd::Closed { code, reason } => {
                        info!(event = "ws_closed", url = %url, code = ?code, reason = %reason);
                        emit(tx, ConnectionEvent::Closed { code, reason }).await?;
                    }
                }
            }
            Err(err) => {
                warn!(event = "ws_connect_error", url = %url, error = %err);
                emit(tx, ConnectionEvent::Error(err.to_string())).await?;
            }
        }

        let decision = tracker.on_close();
        emit(tx, ConnectionEvent::Status(decision.status())).await?;
        match decision {
            CloseDecision::Retry { attempt, delay } => {
                debug!(event = "ws_reconnect_scheduled", attempt, delay_ms = delay.as_millis() as u64);
                tokio::select! {
                    biased;
                    _ = &mut *shutdown => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            CloseDecision::GiveUp { attempts } => {
                warn!(event = "ws_gave_up", url = %url, attempts);
                return Ok(());
            }
        }
    }
}

async fn pump_socket<S>(
    ws: WebSocketStream<S>,
    tx: &mpsc::Sender<ConnectionEvent>,
    shutdown: &mut oneshot::Receiver<()>,
) -> Result<SocketEnd, ReceiverGone>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            biased;
            _ = &mut *shutdown => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                return Ok(SocketEnd::Shutdown);
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => emit(tx, ConnectionEvent::Message(text)).await?,
                Some(Ok(Message::Binary(bytes))) => emit(tx, ConnectionEvent::Binary(bytes)).await?,
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.as_ref().map(|frame| u16::from(frame.code));
                    let reason = frame
                        .map(|frame| frame.reason.into_owned())
                        .unwrap_or_default();
                    return Ok(SocketEnd::Closed { code, reason });
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(event = "ws_read_error", error = %err);
                    emit(tx, ConnectionEvent::Error(err.to_string())).await?;
                    return Ok(SocketEnd::Closed {
                        code: None,
                        reason: err.to_string(),
                    });
                }
                None => {
                    return Ok(SocketEnd::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                }
            },
        }
    }
}
