use std::sync::Arc;

use axum::{
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{message::OutgoingMessage, wire};
use crate::state::AppState;

/// `GET /agent` — the OpAMP-over-WebSocket endpoint. Connection lifecycle
/// mirrors `OnConnecting`/`OnConnected`/`OnMessage`/`OnConnectionClose`
/// (§4.12): accept unconditionally, then run a `select!` loop muxing
/// inbound frames against outbound pushes queued by the notifier.
pub async fn agent_ws_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn handle_socket(mut socket: WebSocket, addr: SocketAddr, state: AppState) {
    let peer_key = addr.to_string();
    state.session.on_connected(&peer_key);

    let (tx, mut rx) = mpsc::unbounded_channel::<OutgoingMessage>();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Binary(bytes))) => {
                        match wire::decode_incoming(&bytes) {
                            Ok(msg) => {
                                let response = state.session.on_message(&peer_key, msg);
                                state.session.refresh_connection(&peer_key, &tx);
                                let encoded = wire::encode_outgoing(response);
                                if socket.send(Message::Binary(encoded.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => state.session.on_read_message_error(&peer_key, &e.to_string()),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        state.session.on_read_message_error(&peer_key, &e.to_string());
                        break;
                    }
                }
            }
            pushed = rx.recv() => {
                match pushed {
                    Some(msg) => {
                        let encoded = wire::encode_outgoing(msg);
                        if socket.send(Message::Binary(encoded.into())).await.is_err() {
                            break;
                        }
                    }
                    None => debug!(peer = %peer_key, "outgoing channel closed"),
                }
            }
        }
    }

    state.session.on_connection_close(&peer_key);
    if let Err(e) = socket.close().await {
        warn!(peer = %peer_key, error = %e, "error closing agent websocket");
    }
}
