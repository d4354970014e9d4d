//! Self-certifying client identifiers.
//!
//! A client identifies itself with a string that carries its own public key, so the server needs
//! no registry to look keys up. The current format is
//!
//! ```txt
//! <format tag>$<base64 of key buffer>
//! WebCrypto-raw.EC.P-256$BJsxA+HaVosJsyVC/Sm7BkeOwCavi1hlG/2FhJl+k4YQsCqMPbETZl0CM8/JHJ3BlUywxRMYTKocQA+deDIsAOQ=
//! ```
//!
//! where the key buffer is an uncompressed elliptic-curve point, `0x04 || X || Y`, exactly what
//! WebCrypto's `exportKey("raw", ...)` returns for an ECDSA P-256 key.
//!
//! An older compact format (base64 of `version || key type || X || Y`, 67 bytes) is understood by
//! [`ClientIdentifier::parse_compact`], but servers only fall back to it when configured to.

use crate::util::hex_slice::HexSlice;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use p256::ecdsa::VerifyingKey;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separates the format tag from the encoded key.
pub const DELIMITER: char = '$';

/// SEC1 tag byte of an uncompressed point.
pub const UNCOMPRESSED_POINT_MARKER: u8 = 0x04;

/// Size of a P-256 coordinate in bytes.
pub const P256_COORDINATE_LEN: usize = 32;

/// Total length of a decoded compact identifier: version (2) + key type (1) + X + Y.
pub const COMPACT_LEN: usize = 2 + 1 + 2 * P256_COORDINATE_LEN;

/// The only compact identifier version ever issued.
pub const COMPACT_VERSION: u16 = 1;

/// Ways in which a client identifier can be rejected.
#[derive(Debug, Error)]
pub enum IdentifierError {
    /// Nothing was supplied at all.
    #[error("the client ID was not supplied by the client")]
    NotSupplied,
    /// Not exactly one `$` separating a format tag from a key.
    #[error(
        "the client ID is of a bad format; expected <format>${{base64-encoded key}}, \
         e.g. WebCrypto-raw.EC.P-256$BJsxA+HaVosJsyVC/S..."
    )]
    BadFormat,
    /// The format tag is not one we know how to read.
    #[error("unknown client ID format {0:?}")]
    UnknownFormat(String),
    /// The key part is not valid base64.
    #[error("the client ID key is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The key buffer is not an uncompressed point with two equally sized coordinates.
    #[error(
        "unknown NIST key format; expected a leading 0x04 byte followed by two coordinates of \
         equal length"
    )]
    UnknownKeyFormat,
    /// A compact identifier did not decode to the expected number of bytes.
    #[error("compact client ID must decode to exactly 67 bytes, got {0}")]
    BadCompactLength(usize),
    /// A compact identifier carried a version other than [`COMPACT_VERSION`].
    #[error("unsupported client ID version {0}; only version 1 is supported")]
    UnsupportedVersion(u16),
    /// A compact identifier carried a key type other than an uncompressed point.
    #[error("unsupported ECDSA key type {0}; expected 4")]
    UnsupportedKeyType(u8),
}

/// Elliptic curves a public key may live on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NamedCurve {
    P256,
}

/// Recognized `<format tag>` values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ClientIdFormat {
    /// Raw uncompressed P-256 point, as exported by WebCrypto.
    WebCryptoRawP256,
}
impl ClientIdFormat {
    pub fn tag(&self) -> &'static str {
        match self {
            ClientIdFormat::WebCryptoRawP256 => "WebCrypto-raw.EC.P-256",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "WebCrypto-raw.EC.P-256" => Some(ClientIdFormat::WebCryptoRawP256),
            _ => None,
        }
    }

    pub fn curve(&self) -> NamedCurve {
        match self {
            ClientIdFormat::WebCryptoRawP256 => NamedCurve::P256,
        }
    }
}
impl fmt::Display for ClientIdFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// An elliptic-curve public key given by its affine coordinates.
///
/// Coordinates are unsigned big-endian integers. They are stored without leading zero bytes, so
/// two keys compare equal exactly when their coordinates are equal as integers. The point is
/// *not* checked to be on the curve; [`EcPublicKey::verifying_key`] returns `None` for a key that
/// cannot be used.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EcPublicKey {
    curve: NamedCurve,
    x: Vec<u8>,
    y: Vec<u8>,
}
impl EcPublicKey {
    pub fn new(curve: NamedCurve, x: &[u8], y: &[u8]) -> Self {
        fn strip(b: &[u8]) -> Vec<u8> {
            let first = b.iter().position(|&v| v != 0).unwrap_or(b.len());
            b[first..].to_vec()
        }
        EcPublicKey {
            curve,
            x: strip(x),
            y: strip(y),
        }
    }

    pub fn curve(&self) -> NamedCurve {
        self.curve
    }

    /// X coordinate, big-endian with leading zeros removed.
    pub fn x(&self) -> &[u8] {
        &self.x
    }

    /// Y coordinate, big-endian with leading zeros removed.
    pub fn y(&self) -> &[u8] {
        &self.y
    }

    /// `0x04 || X || Y`, with both coordinates left-padded to the curve's coordinate size (or to
    /// the longer coordinate, for out-of-range values).
    pub fn to_uncompressed_point(&self) -> Vec<u8> {
        let width = P256_COORDINATE_LEN.max(self.x.len()).max(self.y.len());
        let mut buf = vec![0u8; 1 + 2 * width];
        buf[0] = UNCOMPRESSED_POINT_MARKER;
        buf[1 + width - self.x.len()..1 + width].copy_from_slice(&self.x);
        buf[1 + 2 * width - self.y.len()..].copy_from_slice(&self.y);
        buf
    }

    /// Convert into a key usable for ECDSA verification, if the coordinates describe a point on
    /// the curve.
    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        match self.curve {
            NamedCurve::P256 => {
                if self.x.len() > P256_COORDINATE_LEN || self.y.len() > P256_COORDINATE_LEN {
                    return None;
                }
                VerifyingKey::from_sec1_bytes(&self.to_uncompressed_point()).ok()
            }
        }
    }
}
impl fmt::Debug for EcPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcPublicKey")
            .field("curve", &self.curve)
            .field("x", &HexSlice(&self.x))
            .field("y", &HexSlice(&self.y))
            .finish()
    }
}

/// A parsed client identifier: which format it was written in, and the key it carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentifier {
    format: ClientIdFormat,
    public_key: EcPublicKey,
}

impl ClientIdentifier {
    /// Parse a `<format>$<base64>` identifier. The caller is expected to have trimmed surrounding
    /// whitespace already.
    pub fn parse(client_id: &str) -> Result<Self, IdentifierError> {
        if client_id.is_empty() {
            return Err(IdentifierError::NotSupplied);
        }

        let mut parts = client_id.split(DELIMITER);
        let (Some(tag), Some(content), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(IdentifierError::BadFormat);
        };

        let format = ClientIdFormat::from_tag(tag)
            .ok_or_else(|| IdentifierError::UnknownFormat(tag.to_string()))?;

        let buf = BASE64_STANDARD.decode(content)?;
        let Some((&UNCOMPRESSED_POINT_MARKER, coordinates)) = buf.split_first() else {
            return Err(IdentifierError::UnknownKeyFormat);
        };
        if coordinates.len() % 2 != 0 {
            return Err(IdentifierError::UnknownKeyFormat);
        }
        let (x, y) = coordinates.split_at(coordinates.len() / 2);

        Ok(ClientIdentifier {
            format,
            public_key: EcPublicKey::new(format.curve(), x, y),
        })
    }

    /// Parse the superseded compact identifier: base64 of a 67-byte buffer holding a big-endian
    /// `u16` version, a key type byte and the two 32-byte P-256 coordinates.
    pub fn parse_compact(client_id: &str) -> Result<Self, IdentifierError> {
        if client_id.is_empty() {
            return Err(IdentifierError::NotSupplied);
        }
        let buf = BASE64_STANDARD.decode(client_id)?;
        if buf.len() != COMPACT_LEN {
            return Err(IdentifierError::BadCompactLength(buf.len()));
        }

        let version = u16::from_be_bytes([buf[0], buf[1]]);
        if version != COMPACT_VERSION {
            return Err(IdentifierError::UnsupportedVersion(version));
        }
        if buf[2] != UNCOMPRESSED_POINT_MARKER {
            return Err(IdentifierError::UnsupportedKeyType(buf[2]));
        }
        let (x, y) = buf[3..].split_at(P256_COORDINATE_LEN);

        Ok(ClientIdentifier {
            format: ClientIdFormat::WebCryptoRawP256,
            public_key: EcPublicKey::new(NamedCurve::P256, x, y),
        })
    }

    /// Build the identifier a client holding the matching signing key should present.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let (x, y) = point.as_bytes()[1..].split_at(P256_COORDINATE_LEN);
        ClientIdentifier {
            format: ClientIdFormat::WebCryptoRawP256,
            public_key: EcPublicKey::new(NamedCurve::P256, x, y),
        }
    }

    pub fn format(&self) -> ClientIdFormat {
        self.format
    }

    pub fn public_key(&self) -> &EcPublicKey {
        &self.public_key
    }
}

impl FromStr for ClientIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ClientIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}",
            self.format,
            BASE64_STANDARD.encode(self.public_key.to_uncompressed_point())
        )
    }
}
