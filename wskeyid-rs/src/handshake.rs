//! Server side of the challenge-response handshake.
//!
//! # Authentication process
//!
//! The client connects with a self-certifying identifier (see [`crate::client_id`]). The server
//! parses the public key out of it, sends the client a freshly generated random challenge, and
//! waits for the client to send back an ECDSA P-256 signature. If the signature checks out
//! against the key in the identifier, the client is authenticated as the owner of that
//! identifier.
//!
//! State diagram:
//! ```txt
//!                                  ┌── Network Boundary
//!        ┌──────┐                  │
//!        │ Init ├───────────────── │ ─► CLIENT_ERROR (bad client ID) ──► Errored
//!        └──┬───┘                  │
//!           ├───────────────────── │ ─► SERVER_ERROR (no randomness) ──► Errored
//!           │                      │
//!           ├───────────────────── │ ─► CHALLENGE
//! ┌─────────▼───────┐              │
//! │ ChallengeIssued │◄──────────── │ ── (malformed message) ─► CLIENT_ERROR
//! └─────────┬───────┘              │
//!           │◄──────────────────── │ ── CHALLENGE_RESPONSE
//!           │                      │
//!           ├───────────────────── │ ─► CLIENT_ERROR (bad signature) ──► Rejected
//!           │                      │
//!           └───────────────────── │ ─► CONNECTED ──► Authenticated
//! ```
//!
//! The transport is abstracted behind [`HandshakeChannel`]. If the channel closes while the
//! challenge is outstanding, or if any send fails, the session ends in `Errored` and the caller
//! is expected to tear down the connection.

use crate::api::{ChallengePayload, ErrorPayload, ServerMessage};
use crate::challenge::{Challenge, ChallengeError};
use crate::client_id::{ClientIdentifier, IdentifierError, DELIMITER};
use crate::verify::{parse_challenge_response, SignedResponse};
use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::TryCryptoRng;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// An error raised by the underlying transport.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct TransportError(Box<dyn std::error::Error + Send + Sync + 'static>);
impl TransportError {
    pub fn new(e: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        TransportError(e.into())
    }
}

/// Bidirectional message channel the handshake runs over.
///
/// Implemented by servers for their websocket type. Keepalive frames should be handled inside
/// the implementation and never surface through [`HandshakeChannel::recv`].
#[async_trait]
pub trait HandshakeChannel: Send {
    /// Send one text message.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next inbound message. `Ok(None)` means the peer closed the channel.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Errors that end a handshake session.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The client ID could not be parsed. Reported to the client as a `CLIENT_ERROR`.
    #[error("bad client ID: {0}")]
    ClientId(#[source] IdentifierError),
    /// No challenge could be generated. Reported to the client as a `SERVER_ERROR`.
    #[error("failed to generate challenge: {0}")]
    Challenge(#[source] ChallengeError),
    /// The client's signature did not verify against its own key.
    #[error("the signature provided by the client did not match the public key provided")]
    SignatureMismatch,
    /// The connection closed while the challenge was outstanding.
    #[error("the connection was closed in the middle of the handshake")]
    ConnectionClosed,
    /// The client took too long to send its next message.
    #[error("timed out waiting for challenge response")]
    Timeout,
    /// The client kept sending messages that are not challenge responses.
    #[error("gave up after {0} malformed challenge responses")]
    TooManyMalformedResponses(usize),
    /// Failed to send a message over the channel.
    #[error("failed to send message: {0}")]
    Send(#[source] TransportError),
    /// Failed to receive a message from the channel.
    #[error("failed to receive message: {0}")]
    Receive(#[source] TransportError),
    /// Failed to serialize an outgoing message.
    #[error("failed to serialize message: {0}")]
    Serialization(#[source] serde_json::Error),
    /// [`HandshakeSession::run`] was called on a session that already ran.
    #[error("handshake session has already finished")]
    AlreadyFinished,
}
impl HandshakeError {
    /// Whether the failure is attributable to the connecting client rather than the server or
    /// the network.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            HandshakeError::ClientId(_)
                | HandshakeError::SignatureMismatch
                | HandshakeError::TooManyMalformedResponses(_)
        )
    }
}

/// Optional hardening of the handshake. The default reproduces the plain protocol: no timeout,
/// unlimited retries after malformed messages, and any validly signed payload accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Maximum time to wait for each inbound message once the challenge was sent.
    #[serde(with = "crate::util::duration::option")]
    pub response_timeout: Option<Duration>,
    /// Number of malformed messages tolerated before the session is aborted.
    pub max_malformed_responses: Option<usize>,
    /// Additionally require the signed payload to be the challenge issued in this session.
    pub require_challenge_binding: bool,
    /// Fall back to the compact binary identifier when the client ID has no `$`.
    pub accept_compact_client_ids: bool,
}

/// Where a session is in the handshake.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HandshakeStatus {
    Init,
    ChallengeIssued,
    Authenticated,
    Rejected,
    Errored,
}
impl HandshakeStatus {
    /// Whether the session has reached an outcome.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HandshakeStatus::Init | HandshakeStatus::ChallengeIssued)
    }
}

/// A client that completed the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedClient {
    pub identifier: ClientIdentifier,
}

/// One handshake attempt on one connection.
///
/// The parsed identifier and the issued challenge live only inside [`HandshakeSession::run`] and
/// are dropped when it returns, whatever the outcome.
#[derive(Debug)]
pub struct HandshakeSession {
    client_id: String,
    config: HandshakeConfig,
    status: HandshakeStatus,
}

impl HandshakeSession {
    /// `client_id` is the identifier as supplied by the client, with surrounding whitespace
    /// already trimmed.
    pub fn new(client_id: impl Into<String>, config: HandshakeConfig) -> Self {
        HandshakeSession {
            client_id: client_id.into(),
            config,
            status: HandshakeStatus::Init,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn status(&self) -> HandshakeStatus {
        self.status
    }

    /// Run the handshake to completion over `channel`, drawing the challenge from `rng`.
    #[tracing::instrument(skip_all, fields(client_id = %self.client_id))]
    pub async fn run<C, R>(
        &mut self,
        channel: &mut C,
        rng: &mut R,
    ) -> Result<AuthenticatedClient, HandshakeError>
    where
        C: HandshakeChannel + ?Sized,
        R: TryCryptoRng + Send + ?Sized,
    {
        // A run that was cancelled mid-challenge leaves the session in `ChallengeIssued`; it is
        // not restarted either.
        if self.status != HandshakeStatus::Init {
            return Err(HandshakeError::AlreadyFinished);
        }

        let result = self.drive(channel, rng).await;
        self.status = match &result {
            Ok(_) => HandshakeStatus::Authenticated,
            Err(HandshakeError::SignatureMismatch) => HandshakeStatus::Rejected,
            Err(_) => HandshakeStatus::Errored,
        };
        match &result {
            Ok(_) => tracing::info!("Client authenticated"),
            Err(e) if e.is_client_fault() => tracing::warn!("Client failed to authenticate: {e}"),
            Err(e) => tracing::error!("Handshake aborted: {e}"),
        }
        result
    }

    fn parse_client_id(&self) -> Result<ClientIdentifier, IdentifierError> {
        if self.config.accept_compact_client_ids && !self.client_id.contains(DELIMITER) {
            ClientIdentifier::parse_compact(&self.client_id)
        } else {
            ClientIdentifier::parse(&self.client_id)
        }
    }

    async fn drive<C, R>(
        &mut self,
        channel: &mut C,
        rng: &mut R,
    ) -> Result<AuthenticatedClient, HandshakeError>
    where
        C: HandshakeChannel + ?Sized,
        R: TryCryptoRng + Send + ?Sized,
    {
        let identifier = match self.parse_client_id() {
            Ok(identifier) => identifier,
            Err(e) => {
                let payload = ErrorPayload::new("Bad client ID was supplied", e.to_string())
                    .with_meta("client_id", self.client_id.as_str());
                emit(channel, &ServerMessage::ClientError(payload)).await?;
                return Err(HandshakeError::ClientId(e));
            }
        };
        tracing::debug!("Parsed client ID: {identifier:?}");

        let challenge = match Challenge::generate_with(rng) {
            Ok(challenge) => challenge,
            Err(e) => {
                let payload = ErrorPayload::new("Error generating challenge payload", e.to_string());
                emit(channel, &ServerMessage::ServerError(payload)).await?;
                return Err(HandshakeError::Challenge(e));
            }
        };

        let message = ServerMessage::Challenge(ChallengePayload {
            payload: challenge.encode(),
        });
        emit(channel, &message).await?;
        self.status = HandshakeStatus::ChallengeIssued;

        let mut malformed = 0;
        loop {
            let raw = self.next_message(channel).await?;

            let response = match parse_challenge_response(&raw) {
                Ok(response) => response,
                Err(e) => {
                    malformed += 1;
                    tracing::warn!("Received invalid message while awaiting challenge response: {e}");
                    let payload = ErrorPayload::new(
                        "Not a challenge response",
                        "Expected a challenge response but got something else that the JSON \
                         parser was not able to parse",
                    )
                    .with_meta("error", e.to_string());
                    emit(channel, &ServerMessage::ClientError(payload)).await?;

                    if let Some(limit) = self.config.max_malformed_responses {
                        if malformed > limit {
                            return Err(HandshakeError::TooManyMalformedResponses(malformed));
                        }
                    }
                    continue;
                }
            };

            if !self.accept(&response, &identifier, &challenge) {
                let payload =
                    ErrorPayload::new("Signature verification failed", "The signature failed to verify")
                        .with_meta("payload", BASE64_STANDARD.encode(response.payload()))
                        .with_meta("signature", BASE64_STANDARD.encode(response.signature()));
                emit(channel, &ServerMessage::ClientError(payload)).await?;
                return Err(HandshakeError::SignatureMismatch);
            }

            emit(channel, &ServerMessage::Connected).await?;
            return Ok(AuthenticatedClient { identifier });
        }
    }

    fn accept(
        &self,
        response: &SignedResponse,
        identifier: &ClientIdentifier,
        challenge: &Challenge,
    ) -> bool {
        if self.config.require_challenge_binding && response.payload() != challenge.as_bytes() {
            tracing::warn!("Signed payload is not the challenge issued in this session");
            return false;
        }
        response.verify(identifier)
    }

    async fn next_message<C>(&self, channel: &mut C) -> Result<Vec<u8>, HandshakeError>
    where
        C: HandshakeChannel + ?Sized,
    {
        let received = match self.config.response_timeout {
            Some(timeout) => tokio::time::timeout(timeout, channel.recv())
                .await
                .map_err(|_| HandshakeError::Timeout)?,
            None => channel.recv().await,
        };
        match received {
            Ok(Some(raw)) => Ok(raw),
            Ok(None) => Err(HandshakeError::ConnectionClosed),
            Err(e) => Err(HandshakeError::Receive(e)),
        }
    }
}

/// Serialize and send one server message.
async fn emit<C>(channel: &mut C, message: &ServerMessage) -> Result<(), HandshakeError>
where
    C: HandshakeChannel + ?Sized,
{
    let text = serde_json::to_string(message).map_err(HandshakeError::Serialization)?;
    channel.send_text(text).await.map_err(HandshakeError::Send)
}

/// Authenticate the client on the other end of `channel`, using the operating system's random
/// source for the challenge.
pub async fn authenticate<C>(
    channel: &mut C,
    client_id: &str,
    config: HandshakeConfig,
) -> Result<AuthenticatedClient, HandshakeError>
where
    C: HandshakeChannel + ?Sized,
{
    HandshakeSession::new(client_id, config)
        .run(channel, &mut OsRng)
        .await
}
