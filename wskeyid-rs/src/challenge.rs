//! Random challenges for clients to sign.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::TryCryptoRng;
use thiserror::Error;

/// Number of random bytes in a challenge.
pub const CHALLENGE_LEN: usize = 128;

/// The random source could not produce a challenge.
///
/// This is a failure of the server's environment, never of the client.
#[derive(Debug, Error)]
#[error("failed to read the 128 random bytes needed for the challenge: {0}")]
pub struct ChallengeError(String);

/// A single-use challenge.
///
/// Deliberately neither `Clone` nor `Copy`: a challenge belongs to exactly one handshake session
/// and is dropped with it.
pub struct Challenge {
    bytes: Box<[u8; CHALLENGE_LEN]>,
}

impl Challenge {
    /// Draw a fresh challenge from the operating system's random source.
    pub fn generate() -> Result<Self, ChallengeError> {
        Self::generate_with(&mut OsRng)
    }

    /// Draw a fresh challenge from `rng`.
    pub fn generate_with<R: TryCryptoRng + ?Sized>(rng: &mut R) -> Result<Self, ChallengeError> {
        let mut bytes = Box::new([0u8; CHALLENGE_LEN]);
        rng.try_fill_bytes(bytes.as_mut_slice())
            .map_err(|e| ChallengeError(e.to_string()))?;
        Ok(Challenge { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// Transport (base64) encoding of the challenge.
    pub fn encode(&self) -> String {
        BASE64_STANDARD.encode(self.as_bytes())
    }
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Challenge").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::TryRngCore;

    struct ExhaustedRng;
    impl TryRngCore for ExhaustedRng {
        type Error = std::io::Error;

        fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
            Err(std::io::Error::other("entropy source exhausted"))
        }
        fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
            Err(std::io::Error::other("entropy source exhausted"))
        }
        fn try_fill_bytes(&mut self, _dst: &mut [u8]) -> Result<(), Self::Error> {
            Err(std::io::Error::other("entropy source exhausted"))
        }
    }
    impl TryCryptoRng for ExhaustedRng {}

    #[test]
    fn challenge_is_128_bytes() {
        let challenge = Challenge::generate().unwrap();
        assert_eq!(challenge.as_bytes().len(), CHALLENGE_LEN);
        let decoded = BASE64_STANDARD.decode(challenge.encode()).unwrap();
        assert_eq!(decoded.len(), CHALLENGE_LEN);
        assert_eq!(decoded, challenge.as_bytes());
    }

    #[test]
    fn challenges_differ() {
        let a = Challenge::generate().unwrap();
        let b = Challenge::generate().unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn exhausted_source_is_reported() {
        let err = Challenge::generate_with(&mut ExhaustedRng).unwrap_err();
        assert!(err.to_string().contains("entropy source exhausted"));
    }
}
