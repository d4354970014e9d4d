use crate::serve::AppState;
use crate::socket::{self, WebSocketChannel};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::response::Response;
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::instrument;
use wskeyid_rs::handshake::authenticate;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Self-certifying client identifier. A missing parameter is treated like an empty one, and
    /// reported to the client once the socket is up.
    #[serde(default)]
    client_id: String,
}

/// Axum handler for the `/auth` path.
///
/// Responds with an `Upgrade: websocket`, authenticates the client on the new socket, and on
/// success hands the socket over to [`socket::serve_authenticated`].
#[instrument(skip(ws, state))]
pub async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(socket_addr): ConnectInfo<SocketAddr>,
    Query(params): Query<ConnectParams>,
) -> Response {
    let client_id = params.client_id.trim().to_string();

    ws.on_upgrade(move |mut web_socket| async move {
        tracing::info!("Client connecting from {socket_addr}.");

        let handshake_config = state.config().handshake.clone();
        let mut channel = WebSocketChannel::new(&mut web_socket, socket_addr);
        let result = authenticate(&mut channel, &client_id, handshake_config).await;
        match result {
            Ok(client) => {
                tracing::info!(
                    "Client {} authenticated from {socket_addr}.",
                    client.identifier
                );
                socket::serve_authenticated(web_socket, client, socket_addr).await;
            }
            Err(e) => {
                tracing::warn!("Failed to authenticate client from {socket_addr}: {e}");
                socket::try_close(&mut web_socket, socket_addr).await;
            }
        }
    })
}
