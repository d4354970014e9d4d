//! Messages exchanged over the websocket during authentication.
//!
//! Every message is a JSON object with a `type` discriminator and, for most kinds, a `data` body:
//!
//! ```txt
//! server -> client   {"type": "CHALLENGE", "data": {"payload": "<base64, 128 bytes>"}}
//! client -> server   {"type": "CHALLENGE_RESPONSE", "data": {"payload": "<base64>", "signature": "<base64 r || s>"}}
//! server -> client   {"type": "CONNECTED"}
//! server -> client   {"type": "CLIENT_ERROR", "data": {"title": "...", "detail": "...", "meta": {...}}}
//! server -> client   {"type": "SERVER_ERROR", "data": {"title": "...", "detail": "..."}}
//! ```

use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use std::collections::BTreeMap;

/// `type` of the message a client sends in reply to a challenge.
pub const CHALLENGE_RESPONSE_KIND: &str = "CHALLENGE_RESPONSE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengePayload {
    /// Base64 of the random challenge bytes.
    pub payload: String,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// The bytes the client signed.
    #[serde_as(as = "Base64")]
    pub payload: Vec<u8>,
    /// ECDSA signature over SHA-256 of `payload`, as big-endian `r || s`.
    #[serde_as(as = "Base64")]
    pub signature: Vec<u8>,
}

/// Body of `CLIENT_ERROR` and `SERVER_ERROR` messages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub title: String,
    pub detail: String,
    /// Context for diagnosing the failure. Server errors leave this empty.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}
impl ErrorPayload {
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        ErrorPayload {
            title: title.into(),
            detail: detail.into(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ServerMessage {
    Challenge(ChallengePayload),
    Connected,
    ClientError(ErrorPayload),
    ServerError(ErrorPayload),
}

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ClientMessage {
    ChallengeResponse(ChallengeResponse),
}

/// The outer shape shared by all messages, with the body left undecoded.
///
/// Servers decode inbound messages in two steps, first the envelope to check the `type`, then the
/// body, so that a well-formed message of the wrong kind can be told apart from garbage.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}
