//! Handling of the actual WebSocket connection that clients authenticate over.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use std::net::SocketAddr;
use wskeyid_rs::api::RawEnvelope;
use wskeyid_rs::handshake::{AuthenticatedClient, HandshakeChannel, TransportError};

/// Runs the handshake over an axum [`WebSocket`].
///
/// PING and PONG frames are answered by axum itself and skipped here; a close frame counts as the
/// channel closing.
pub struct WebSocketChannel<'a> {
    socket: &'a mut WebSocket,
    remote_addr: SocketAddr,
}
impl<'a> WebSocketChannel<'a> {
    pub fn new(socket: &'a mut WebSocket, remote_addr: SocketAddr) -> Self {
        WebSocketChannel {
            socket,
            remote_addr,
        }
    }
}

#[async_trait]
impl HandshakeChannel for WebSocketChannel<'_> {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(TransportError::new)
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let remote_addr = self.remote_addr;
        while let Some(r) = self.socket.recv().await {
            match r {
                Ok(Message::Text(s)) => return Ok(Some(s.into_bytes())),
                Ok(Message::Binary(b)) => return Ok(Some(b)),
                Ok(Message::Ping(_)) => {
                    tracing::trace!("websocket ping'ed by {remote_addr}");
                }
                Ok(Message::Pong(_)) => {
                    tracing::trace!("websocket pong'ed by {remote_addr}");
                }
                Ok(Message::Close(maybe_cf)) => {
                    let cm = maybe_cf
                        .map(|cf| format!("({}) {}", cf.code, cf.reason))
                        .unwrap_or("<no close frame>".to_string());
                    tracing::debug!(
                        "Received close message from {remote_addr} during authentication: {cm}"
                    );
                    return Ok(None);
                }
                Err(e) => {
                    tracing::error!(
                        "Error receiving from {remote_addr} during authentication: {e}"
                    );
                    return Err(TransportError::new(e));
                }
            }
        }
        tracing::debug!("Connection from {remote_addr} closed without close frame");
        Ok(None)
    }
}

/// Send a close frame, logging (but otherwise ignoring) failure.
pub async fn try_close(socket: &mut WebSocket, remote_addr: SocketAddr) {
    if let Err(e) = socket.send(Message::Close(None)).await {
        tracing::debug!("Failed to send close frame to {remote_addr}: {e}.");
    }
    // .send(..::Close(..)) already closes the socket, so no need to call .close()
}

/// Post-authentication run-loop. Logs what the client sends until it disconnects.
pub async fn serve_authenticated(
    mut socket: WebSocket,
    client: AuthenticatedClient,
    remote_addr: SocketAddr,
) {
    let client_id = client.identifier;
    while let Some(r) = socket.recv().await {
        match r {
            Ok(Message::Text(s)) => match serde_json::from_str::<RawEnvelope>(&s) {
                Ok(envelope) => {
                    tracing::info!("Got {} message from {client_id}", envelope.kind)
                }
                Err(e) => tracing::warn!("Got undecodable message from {client_id}: {e}"),
            },
            Ok(Message::Binary(b)) => {
                tracing::info!("Got {} byte binary message from {client_id}", b.len())
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Error receiving from {client_id} ({remote_addr}): {e}");
                return;
            }
        }
    }
    tracing::info!("Client {client_id} ({remote_addr}) closed the connection.");
}
