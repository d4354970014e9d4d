//! Parsing and verification of challenge responses.

use crate::api::{ChallengeResponse, RawEnvelope, CHALLENGE_RESPONSE_KIND};
use crate::client_id::ClientIdentifier;
use p256::ecdsa::signature::DigestVerifier;
use p256::ecdsa::Signature;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Size of each of the two signature scalars, `r` and `s`.
pub const SCALAR_LEN: usize = 32;

/// Shortest signature buffer that can be split into `r` and `s`.
pub const SIGNATURE_MIN_LEN: usize = 2 * SCALAR_LEN;

/// An inbound message that is not a usable challenge response.
///
/// These are protocol errors the client can recover from by sending a correct message.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// Not a JSON message envelope at all.
    #[error("failed to decode message envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    /// A well-formed message of some other kind.
    #[error("the message received was not a challenge response (type {0:?})")]
    NotAChallengeResponse(String),
    /// A challenge response whose body is missing fields or isn't base64.
    #[error("failed to decode challenge response body: {0}")]
    Body(#[source] serde_json::Error),
}

/// The plaintext and signature carried by a challenge response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedResponse {
    payload: Vec<u8>,
    signature: Vec<u8>,
}

/// Decode a raw inbound message into a [`SignedResponse`].
pub fn parse_challenge_response(raw: &[u8]) -> Result<SignedResponse, ResponseError> {
    let envelope: RawEnvelope = serde_json::from_slice(raw).map_err(ResponseError::Envelope)?;
    if envelope.kind != CHALLENGE_RESPONSE_KIND {
        return Err(ResponseError::NotAChallengeResponse(envelope.kind));
    }
    let ChallengeResponse { payload, signature } =
        serde_json::from_value(envelope.data).map_err(ResponseError::Body)?;
    Ok(SignedResponse { payload, signature })
}

impl SignedResponse {
    pub fn new(payload: Vec<u8>, signature: Vec<u8>) -> Self {
        SignedResponse { payload, signature }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Split the signature into big-endian `r` and `s`.
    ///
    /// `r` is the first 32 bytes and `s` everything after it. A longer-than-64-byte buffer is
    /// only accepted when the surplus leading bytes of `s` are zero, i.e. `s` still fits in 32
    /// bytes as an integer.
    pub fn split_signature(&self) -> Option<([u8; SCALAR_LEN], [u8; SCALAR_LEN])> {
        if self.signature.len() < SIGNATURE_MIN_LEN {
            return None;
        }
        let (r, s) = self.signature.split_at(SCALAR_LEN);
        let (surplus, s) = s.split_at(s.len() - SCALAR_LEN);
        if surplus.iter().any(|&b| b != 0) {
            return None;
        }
        Some((r.try_into().ok()?, s.try_into().ok()?))
    }

    /// Check the signature against SHA-256 of the payload with `client`'s key.
    ///
    /// Any failure, including a short signature or an unusable key, is simply `false`. This does
    /// not check what the payload is.
    pub fn verify(&self, client: &ClientIdentifier) -> bool {
        let Some((r, s)) = self.split_signature() else {
            return false;
        };
        let Some(key) = client.public_key().verifying_key() else {
            return false;
        };
        let mut rs = [0u8; SIGNATURE_MIN_LEN];
        rs[..SCALAR_LEN].copy_from_slice(&r);
        rs[SCALAR_LEN..].copy_from_slice(&s);
        let Ok(signature) = Signature::from_slice(&rs) else {
            return false;
        };
        key.verify_digest(Sha256::new_with_prefix(&self.payload), &signature)
            .is_ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::SigningKey;
    use serde_json::json;

    fn signing_key() -> SigningKey {
        SigningKey::from_slice(&[0x42; 32]).unwrap()
    }

    fn signed(payload: &[u8]) -> SignedResponse {
        let signature: Signature = signing_key().sign(payload);
        SignedResponse::new(payload.to_vec(), signature.to_bytes().to_vec())
    }

    fn client() -> ClientIdentifier {
        ClientIdentifier::from_verifying_key(signing_key().verifying_key())
    }

    #[test]
    fn valid_signature_verifies() {
        assert!(signed(b"some challenge").verify(&client()));
    }

    #[test]
    fn flipped_bits_fail() {
        let good = signed(b"some challenge");
        // One bit in r, one bit in s.
        for idx in [0, 31, 32, 63] {
            let mut sig = good.signature().to_vec();
            sig[idx] ^= 0x01;
            assert!(!SignedResponse::new(good.payload().to_vec(), sig).verify(&client()));
        }
        let mut payload = good.payload().to_vec();
        payload[3] ^= 0x80;
        assert!(!SignedResponse::new(payload, good.signature().to_vec()).verify(&client()));
    }

    #[test]
    fn wrong_key_fails() {
        let other = SigningKey::from_slice(&[0x17; 32]).unwrap();
        let other = ClientIdentifier::from_verifying_key(other.verifying_key());
        assert!(!signed(b"some challenge").verify(&other));
    }

    #[test]
    fn short_signature_fails() {
        let good = signed(b"x");
        let short = SignedResponse::new(b"x".to_vec(), good.signature()[..63].to_vec());
        assert_eq!(short.split_signature(), None);
        assert!(!short.verify(&client()));
    }

    #[test]
    fn long_signature_with_zero_padding() {
        let good = signed(b"x");
        let mut sig = good.signature()[..32].to_vec();
        sig.extend_from_slice(&[0, 0]);
        sig.extend_from_slice(&good.signature()[32..]);
        assert!(SignedResponse::new(b"x".to_vec(), sig.clone()).verify(&client()));

        sig[32] = 1;
        assert!(!SignedResponse::new(b"x".to_vec(), sig).verify(&client()));
    }

    #[test]
    fn parse_steps() {
        let raw = json!({
            "type": "CHALLENGE_RESPONSE",
            "data": {"payload": "aGk=", "signature": "//8="},
        })
        .to_string();
        let parsed = parse_challenge_response(raw.as_bytes()).unwrap();
        assert_eq!(parsed.payload(), b"hi");
        assert_eq!(parsed.signature(), [0xffu8, 0xff]);

        assert!(matches!(
            parse_challenge_response(b"not json"),
            Err(ResponseError::Envelope(_))
        ));
        let other = json!({"type": "TEXT_MESSAGE", "data": "hello"}).to_string();
        assert!(matches!(
            parse_challenge_response(other.as_bytes()),
            Err(ResponseError::NotAChallengeResponse(kind)) if kind == "TEXT_MESSAGE"
        ));
        let missing = json!({"type": "CHALLENGE_RESPONSE", "data": {"payload": "aGk="}}).to_string();
        assert!(matches!(
            parse_challenge_response(missing.as_bytes()),
            Err(ResponseError::Body(_))
        ));
        let not_b64 =
            json!({"type": "CHALLENGE_RESPONSE", "data": {"payload": "*", "signature": "*"}})
                .to_string();
        assert!(matches!(
            parse_challenge_response(not_b64.as_bytes()),
            Err(ResponseError::Body(_))
        ));
    }
}
