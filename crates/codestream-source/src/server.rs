use crate::tracker::FileTracker;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use codestream_core::{encode_event, FileChangeEvent};
use futures_util::{SinkExt, StreamExt};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

const CLIENT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

struct Client {
    conn_id: String,
    sender: mpsc::Sender<Message>,
}

impl Client {
    async fn send_text(&self, text: &str) -> bool {
        self.sender.send(Message::Text(text.to_string())).await.is_ok()
    }

    async fn close(&self, reason: &str) {
        let _ = self
            .sender
            .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                code: 1000,
                reason: reason.to_string().into(),
            })))
            .await;
    }
}

/// Shared by the watcher and every websocket connection.
pub struct SourceState {
    conn_counter: AtomicU64,
    clients: RwLock<HashMap<String, Arc<Client>>>,
    tracker: RwLock<FileTracker>,
    max_payload_bytes: usize,
    write_timeout: Duration,
}

impl SourceState {
    pub fn new(tracker: FileTracker, max_payload_bytes: usize) -> Self {
        Self {
            conn_counter: AtomicU64::new(0),
            clients: RwLock::new(HashMap::new()),
            tracker: RwLock::new(tracker),
            max_payload_bytes,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn tracker(&self) -> &RwLock<FileTracker> {
        &self.tracker
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    fn next_conn_id(&self) -> String {
        let id = self.conn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("conn-{id}")
    }

    async fn register_client(&self, client: Arc<Client>) {
        self.clients
            .write()
            .await
            .insert(client.conn_id.clone(), client.clone());
        info!(event = "client_connected", conn_id = %client.conn_id);
    }

    async fn remove_client(&self, client: &Client, reason: &str) {
        client.close(reason).await;
        if self.clients.write().await.remove(&client.conn_id).is_some() {
            info!(event = "client_removed", conn_id = %client.conn_id, reason = reason);
        }
    }

    async fn snapshot_clients(&self) -> Vec<Arc<Client>> {
        self.clients.read().await.values().cloned().collect()
    }

    fn encode(&self, event: &FileChangeEvent) -> Option<String> {
        match encode_event(event, self.max_payload_bytes) {
            Ok(raw) => Some(raw),
            Err(err) => {
                warn!(event = "encode_error", filepath = %event.filepath, error = %err);
                None
            }
        }
    }

    /// Sends one change event to every connected viewer.
    pub async fn publish(&self, event: &FileChangeEvent) {
        let Some(raw) = self.encode(event) else {
            return;
        };
        let clients = self.snapshot_clients().await;
        debug!(event = "publish", filepath = %event.filepath, clients = clients.len());
        for client in clients {
            if !client.send_text(&raw).await {
                warn!(event = "send_error", conn_id = %client.conn_id);
                self.remove_client(&client, "send_error").await;
            }
        }
    }

    async fn send_snapshot(&self, client: &Client) {
        let events = self.tracker.read().await.snapshot();
        let mut sent = 0usize;
        for event in &events {
            let Some(raw) = self.encode(event) else {
                continue;
            };
            if !client.send_text(&raw).await {
                warn!(event = "snapshot_error", conn_id = %client.conn_id);
                self.remove_client(client, "snapshot_error").await;
                return;
            }
            sent += 1;
        }
        info!(event = "snapshot_sent", conn_id = %client.conn_id, count = sent);
    }

    async fn handle_socket(self: Arc<Self>, socket: WebSocket, remote: SocketAddr) {
        let (mut ws_sender, mut ws_receiver) = socket.split();
        let (tx, mut rx) = mpsc::channel::<Message>(CLIENT_QUEUE_CAPACITY);
        let write_timeout = self.write_timeout;
        let write_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let send = ws_sender.send(msg);
                if tokio::time::timeout(write_timeout, send).await.is_err() {
                    return;
                }
            }
        });

        let client = Arc::new(Client {
            conn_id: self.next_conn_id(),
            sender: tx.clone(),
        });
        debug!(event = "client_accepted", conn_id = %client.conn_id, remote = %remote);
        self.register_client(client.clone()).await;
        self.send_snapshot(&client).await;

        // viewers never send anything meaningful; read only to notice the close
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    info!(event = "client_close", conn_id = %client.conn_id);
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(event = "read_error", conn_id = %client.conn_id, error = %err);
                    break;
                }
            }
        }

        self.remove_client(&client, "disconnect").await;
        drop(client);
        drop(tx);
        let _ = write_task.await;
    }
}

pub fn router(state: Arc<SourceState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<SourceState>>,
) -> impl IntoResponse {
    if !addr.ip().is_loopback() {
        return axum::http::StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| async move {
        state.handle_socket(socket, addr).await;
    })
}
