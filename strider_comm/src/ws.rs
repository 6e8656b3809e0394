//! WebSocket adapter on axum.
//!
//! One route upgrades clients; each connection gets a client id, a bounded
//! outbound queue and a forwarding task. The bus-facing half is the shared
//! [`CommCore`]; this module only moves bytes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use strider_bus::EventBus;
use strider_common::consts::MAX_CID;

use crate::core::{ClientId, CommCore, FrameSender};
use crate::error::CommError;

/// Outbound frames queued per client before the slow-client drop policy
/// kicks in.
const OUTBOUND_DEPTH: usize = 32;

/// Client slot registry: one bounded sender per connected client.
#[derive(Default)]
struct ClientRegistry {
    slots: Mutex<[Option<mpsc::Sender<Vec<u8>>>; MAX_CID]>,
}

impl ClientRegistry {
    /// Claim a free client id for a new connection.
    fn alloc(&self, tx: mpsc::Sender<Vec<u8>>) -> Result<ClientId, CommError> {
        let mut slots = self.slots.lock();
        for (cid, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(tx);
                return Ok(cid);
            }
        }
        Err(CommError::ClientLimit)
    }

    fn release(&self, cid: ClientId) {
        if let Some(slot) = self.slots.lock().get_mut(cid) {
            *slot = None;
        }
    }

    fn sender_for(&self, cid: ClientId) -> Option<mpsc::Sender<Vec<u8>>> {
        self.slots.lock().get(cid).and_then(Clone::clone)
    }
}

/// Bus-to-socket half: looks up the client's queue and drops the frame if
/// the client is too slow to drain it (telemetry is lossy by design).
struct WsSender {
    registry: Arc<ClientRegistry>,
}

impl FrameSender for WsSender {
    fn send(&self, cid: ClientId, bytes: &[u8]) -> Result<(), CommError> {
        let Some(tx) = self.registry.sender_for(cid) else {
            return Err(CommError::UnknownClient(cid));
        };
        tx.try_send(bytes.to_vec())
            .map_err(|e| CommError::Send(e.to_string()))
    }
}

struct WsShared {
    core: CommCore,
    registry: Arc<ClientRegistry>,
}

/// Bind and serve the WebSocket endpoint at `/ws` until the task is
/// dropped.
pub async fn serve(bus: EventBus, addr: SocketAddr) -> Result<(), CommError> {
    let registry = Arc::new(ClientRegistry::default());
    let core = CommCore::new(
        bus,
        Box::new(WsSender {
            registry: Arc::clone(&registry),
        }),
        "ws",
    );
    let shared = Arc::new(WsShared { core, registry });

    let app = Router::new()
        .route("/ws", get(upgrade))
        .with_state(shared);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CommError::Transport(e.to_string()))?;
    info!("websocket adapter listening on {addr}");
    axum::serve(listener, app)
        .await
        .map_err(|e| CommError::Transport(e.to_string()))
}

async fn upgrade(ws: WebSocketUpgrade, State(shared): State<Arc<WsShared>>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, shared))
}

async fn client_session(socket: WebSocket, shared: Arc<WsShared>) {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_DEPTH);
    let cid = match shared.registry.alloc(tx) {
        Ok(cid) => cid,
        Err(err) => {
            warn!("rejecting websocket client: {err}");
            return;
        }
    };
    info!("ws client {cid} connected");

    let (mut sink, mut stream) = socket.split();

    // Forward queued bus emissions to the socket.
    let forward = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            let message = if cfg!(feature = "msgpack") {
                Message::Binary(bytes)
            } else {
                match String::from_utf8(bytes) {
                    Ok(text) => Message::Text(text),
                    Err(_) => continue,
                }
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames go through the shared core.
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Binary(bytes)) => shared.core.handle_frame(cid, &bytes),
            Ok(Message::Text(text)) => shared.core.handle_frame(cid, text.as_bytes()),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    // Subscriptions die with the connection, before the next dispatch can
    // touch this client's slot.
    shared.core.disconnect(cid);
    shared.registry.release(cid);
    forward.abort();
    debug!("ws client {cid} gone");
}

// ─── Tests ──────────────────────────────────────────────────────────
