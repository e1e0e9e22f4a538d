use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{stream::StreamExt, SinkExt};
use pairlink_common::{Error, ProtocolError, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::server::{Connection, ConnectionId, RelayServer};
use crate::AppState;

pub const DEFAULT_OUTBOX_CAPACITY: usize = 128;
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Per-socket limits applied by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLimits {
    pub max_message_bytes: usize,
    pub outbox_capacity: usize,
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

/// Outbound half of one WebSocket as seen by the relay.
pub struct Signaler {
    outbox: mpsc::Sender<Message>,
    shutdown: mpsc::Sender<()>,
}

impl Signaler {
    fn send_error(&self, err: &Error) {
        let frame = ServerMessage::Error {
            message: err.to_string(),
        };
        match frame.to_json() {
            Ok(json) => {
                let _ = self.outbox.try_send(Message::Text(json));
            }
            Err(err) => warn!("failed to encode error frame: {}", err),
        }
    }

    fn close(&self) {
        let _ = self.outbox.try_send(Message::Close(None));
    }
}

impl Connection for Signaler {
    fn send(&self, text: String) -> bool {
        self.outbox.try_send(Message::Text(text)).is_ok()
    }

    fn disconnect(&self) {
        let _ = self.shutdown.try_send(());
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let limits = state.limits;
    ws.max_message_size(limits.max_message_bytes)
        .max_frame_size(limits.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state.relay, limits))
}

async fn handle_socket(stream: WebSocket, relay: Arc<RelayServer>, limits: TransportLimits) {
    let (mut sender, mut receiver) = stream.split();
    let (tx, mut rx) = mpsc::channel::<Message>(limits.outbox_capacity.max(1));
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let writer_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || closing {
                break;
            }
        }
        let _ = writer_shutdown.try_send(());
    });

    let signaler = Arc::new(Signaler {
        outbox: tx,
        shutdown: shutdown_tx,
    });

    let id = match relay.on_connection(signaler.clone()).await {
        Ok(id) => id,
        Err(err) => {
            warn!("refusing socket: {}", err);
            signaler.send_error(&Error::from(err));
            signaler.close();
            return;
        }
    };
    info!("{} connected", id);

    let (inbox, inbox_rx) = mpsc::channel::<String>(limits.outbox_capacity.max(1));
    let processor = tokio::spawn(process_inbound(
        relay.clone(),
        id,
        signaler.clone(),
        inbox_rx,
    ));

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("{} closed by relay", id);
                break;
            }
            msg = receiver.next() => {
                let Some(Ok(msg)) = msg else { break; };

                let text = match msg {
                    Message::Text(text) => text,
                    Message::Binary(_) => {
                        let err: Error = ProtocolError::UnsupportedFrame("binary".into()).into();
                        warn!("{} sent a binary frame", id);
                        signaler.send_error(&err);
                        break;
                    }
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => continue,
                };

                if let Err(err) = inbox.try_send(text) {
                    warn!("{} inbound queue unavailable: {}", id, err);
                    break;
                }
            }
        }
    }

    // A validation still in flight must not outlive the socket.
    processor.abort();
    let _ = processor.await;

    relay.on_disconnection(id).await;
    signaler.close();
    info!("{} disconnected", id);
}

/// Feeds queued frames to the relay one at a time, in arrival order.
async fn process_inbound(
    relay: Arc<RelayServer>,
    id: ConnectionId,
    signaler: Arc<Signaler>,
    mut inbox: mpsc::Receiver<String>,
) {
    while let Some(text) = inbox.recv().await {
        match relay.on_message(id, &text).await {
            Ok(()) => {}
            Err(err) if err.is_fatal_to_connection() => {
                warn!("disconnecting {}: {}", id, err);
                signaler.send_error(&err);
                signaler.disconnect();
                break;
            }
            Err(err) => {
                debug!("{} message rejected: {}", id, err);
                signaler.send_error(&err);
            }
        }
    }
}
