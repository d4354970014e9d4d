//! Loading and creating the client's P-256 signing key.

use crate::ConfigError;
use p256::ecdsa::SigningKey;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use std::path::Path;
use wskeyid_rs::client_id::ClientIdentifier;

/// Read a PKCS#8 PEM private key from `path`.
pub fn load_signing_key(path: &Path) -> Result<SigningKey, ConfigError> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
    SigningKey::from_pkcs8_pem(&pem).map_err(ConfigError::InvalidKey)
}

pub fn generate_signing_key() -> SigningKey {
    SigningKey::random(&mut rand_core::OsRng)
}

/// Write `key` to `path` as PKCS#8 PEM.
pub fn write_signing_key(path: &Path, key: &SigningKey) -> Result<(), ConfigError> {
    let pem = key.to_pkcs8_pem(LineEnding::LF).map_err(ConfigError::InvalidKey)?;
    std::fs::write(path, pem.as_bytes())
        .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))
}

/// The identifier a server derives for `key`.
pub fn client_id(key: &SigningKey) -> ClientIdentifier {
    ClientIdentifier::from_verifying_key(key.verifying_key())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identifier_round_trips_through_parser() {
        let key = generate_signing_key();
        let id = client_id(&key);
        let parsed: ClientIdentifier = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(
            parsed.public_key().verifying_key().as_ref(),
            Some(key.verifying_key())
        );
    }

    #[test]
    fn saved_key_loads_back() {
        let path = std::env::temp_dir().join(format!(
            "wsk-client-key-test-{}.pem",
            std::process::id()
        ));
        let key = generate_signing_key();
        write_signing_key(&path, &key).unwrap();
        let loaded = load_signing_key(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.to_bytes(), key.to_bytes());
    }

    #[test]
    fn missing_key_file() {
        let err = load_signing_key(Path::new("/nonexistent/wsk-client.pem")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_, _)));
    }

    #[test]
    fn garbage_key_file() {
        let path = std::env::temp_dir().join(format!(
            "wsk-client-garbage-test-{}.pem",
            std::process::id()
        ));
        std::fs::write(&path, "not a key").unwrap();
        let err = load_signing_key(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, ConfigError::InvalidKey(_)));
    }
}
