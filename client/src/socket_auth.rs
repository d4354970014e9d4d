//! Handles authentication for outgoing websocket connection.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use wskeyid_rs::api::{ChallengeResponse, ClientMessage, ErrorPayload, ServerMessage};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to send to server: {0}")]
    Send(tungstenite::Error),
    #[error("failed to receive from server: {0}")]
    Receive(tungstenite::Error),
    #[error("failed to serialize response: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to decode server message: {0}")]
    Deserialization(serde_json::Error),
    #[error("challenge payload is not valid base64: {0}")]
    InvalidChallenge(base64::DecodeError),
    #[error("server rejected client: {} ({})", .0.title, .0.detail)]
    Rejected(ErrorPayload),
    #[error("server failed: {} ({})", .0.title, .0.detail)]
    ServerError(ErrorPayload),
    #[error("unexpected message from server: {0}")]
    UnexpectedMessage(String),
    #[error("server closed the connection before authentication completed")]
    Closed,
}

/// Sign `payload` the way the server verifies it: ECDSA over SHA-256, encoded as `r || s`.
pub fn sign_challenge(signing_key: &SigningKey, payload: &[u8]) -> ChallengeResponse {
    let signature: Signature = signing_key.sign(payload);
    ChallengeResponse {
        payload: payload.to_vec(),
        signature: signature.to_bytes().to_vec(),
    }
}

/// Answer the server's challenge until it reports `CONNECTED` or an error.
pub async fn authenticate<S>(
    socket: &mut WebSocketStream<S>,
    signing_key: &SigningKey,
) -> Result<(), AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = match socket.next().await {
            Some(Ok(m)) => m,
            Some(Err(e)) => return Err(AuthError::Receive(e)),
            None => return Err(AuthError::Closed),
        };
        let text = match message {
            Message::Text(s) => s,
            Message::Binary(b) => String::from_utf8(b).map_err(|e| {
                AuthError::UnexpectedMessage(format!("binary message is not UTF-8: {e}"))
            })?,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            Message::Close(_) => return Err(AuthError::Closed),
        };

        match serde_json::from_str::<ServerMessage>(&text).map_err(AuthError::Deserialization)? {
            ServerMessage::Challenge(challenge) => {
                let payload = BASE64_STANDARD
                    .decode(&challenge.payload)
                    .map_err(AuthError::InvalidChallenge)?;
                tracing::debug!("Signing {} byte challenge", payload.len());
                let response =
                    ClientMessage::ChallengeResponse(sign_challenge(signing_key, &payload));
                let text =
                    serde_json::to_string(&response).map_err(AuthError::Serialization)?;
                socket
                    .send(Message::Text(text))
                    .await
                    .map_err(AuthError::Send)?;
            }
            ServerMessage::Connected => {
                tracing::info!("Authenticated to server");
                return Ok(());
            }
            ServerMessage::ClientError(e) => return Err(AuthError::Rejected(e)),
            ServerMessage::ServerError(e) => return Err(AuthError::ServerError(e)),
            other => return Err(AuthError::UnexpectedMessage(format!("{other:?}"))),
        }
    }
}
