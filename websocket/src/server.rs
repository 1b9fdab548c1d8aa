//! WebSocket server implementation.
//!
//! Accepts WebSocket connections at `/ws`. A connection's first subscribe
//! request registers one fan-out subscription and spawns the forwarder task
//! that relays it to the client; later requests widen or narrow that same
//! subscription. Per-issue ordering holds for the whole connection because a
//! single forwarder drains a single ordered channel.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use civic_fanout::{ChangeFanout, Subscription};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::subscriptions::{scope_of, ClientMessage, ClientSubscriptions, ServerMessage};

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared state for the WebSocket server.
#[derive(Clone)]
pub struct WsState {
    pub fanout: ChangeFanout,
}

/// The WebSocket server, configured with a port and shared state.
pub struct WebSocketServer {
    pub port: u16,
    pub state: WsState,
}

impl WebSocketServer {
    pub fn new(port: u16, fanout: ChangeFanout) -> Self {
        Self {
            port,
            state: WsState { fanout },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves.
    pub async fn start(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), WsError> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| WsError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(%addr, "WebSocket server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize and send one message. Returns `false` once the client is gone.
async fn send_message(sender: &WsSender, msg: &ServerMessage) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "failed to encode server message");
            return true;
        }
    };
    sender.lock().await.send(Message::Text(text)).await.is_ok()
}

/// Handle a single WebSocket connection.
///
/// The flow:
/// 1. Split the socket into sender and receiver halves.
/// 2. Listen for client messages (subscribe, unsubscribe, ping).
/// 3. On the first subscribe, spawn the forwarder task that owns the
///    connection's fan-out subscription; later requests adjust its scopes.
/// 4. Abort the forwarder when the client disconnects, releasing the
///    subscription.
async fn handle_socket(socket: WebSocket, state: WsState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(ws_sender));
    let mut client_subs = ClientSubscriptions::new();

    debug!("websocket client connected");

    while let Some(msg_result) = ws_receiver.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "websocket receive error");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if !handle_text_message(&text, &state, &mut client_subs, &ws_sender).await {
                    break;
                }
            }
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(data) => {
                let _ = ws_sender.lock().await.send(Message::Pong(data)).await;
            }
            _ => {}
        }
    }

    let held = client_subs.len();
    client_subs.clear();
    debug!(released = held, "websocket client disconnected");
}

/// Process a text message from the client. Returns `false` if the client can
/// no longer be written to.
async fn handle_text_message(
    text: &str,
    state: &WsState,
    client_subs: &mut ClientSubscriptions,
    ws_sender: &WsSender,
) -> bool {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            let error = ServerMessage::Error {
                message: format!("invalid message: {e}"),
            };
            return send_message(ws_sender, &error).await;
        }
    };

    match client_msg {
        ClientMessage::Subscribe { issue } => {
            let scope = scope_of(issue);
            let sender = ws_sender.clone();
            let added = client_subs.add(&state.fanout, scope, |subscription| {
                tokio::spawn(forward_changes(subscription, sender))
            });
            debug!(%scope, added, "client subscribed");

            let ack = ServerMessage::Ack {
                action: "subscribe".to_string(),
                issue,
            };
            send_message(ws_sender, &ack).await
        }
        ClientMessage::Unsubscribe { issue } => {
            let scope = scope_of(issue);
            let reply = if client_subs.remove(&state.fanout, &scope) {
                debug!(%scope, "client unsubscribed");
                ServerMessage::Ack {
                    action: "unsubscribe".to_string(),
                    issue,
                }
            } else {
                ServerMessage::Error {
                    message: format!("not subscribed to {scope}"),
                }
            };
            send_message(ws_sender, &reply).await
        }
        ClientMessage::Ping => send_message(ws_sender, &ServerMessage::Pong).await,
    }
}

/// Forwarder task: relays the connection's subscription to the client until
/// either side goes away.
async fn forward_changes(mut subscription: Subscription, ws_sender: WsSender) {
    while let Some(change) = subscription.recv().await {
        if !send_message(&ws_sender, &ServerMessage::from(change)).await {
            break;
        }
    }
    debug!(subscription = ?subscription.id(), "forwarder finished");
}
