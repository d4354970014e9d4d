//! Client side of the wskeyid handshake.
//!
//! Opens a websocket to a server's `/auth` endpoint, presenting the identifier derived from a P-256
//! signing key, and answers the server's challenge with a signature made by that key.

pub mod keys;
pub mod socket_auth;

use p256::ecdsa::SigningKey;
use std::path::PathBuf;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

/// Name of the query parameter carrying the client identifier.
pub const CLIENT_ID_PARAM: &str = "client_id";

#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// PKCS8 PEM FILE
    pub private_key: PathBuf,
    /// `ws://` or `wss://` URI of the server's authentication endpoint.
    pub server_uri: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read private key from {0}: {1}")]
    IoError(PathBuf, std::io::Error),
    #[error("invalid private key: {0}")]
    InvalidKey(p256::pkcs8::Error),
    #[error("invalid server URI: {0}")]
    InvalidUri(url::ParseError),
}

#[derive(Debug, Error)]
pub enum WsClientError {
    #[error("invalid configuration: {0}")]
    Config(ConfigError),
    #[error("failed to connect to remote host: {0}")]
    Connection(tungstenite::Error),
    #[error("failed to authenticate: {0}")]
    Authentication(socket_auth::AuthError),
}

pub type AuthenticatedSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Load the key named by `config` and connect with it.
pub async fn connect(config: &WsClientConfig) -> Result<AuthenticatedSocket, WsClientError> {
    let signing_key =
        keys::load_signing_key(&config.private_key).map_err(WsClientError::Config)?;
    connect_with_key(&config.server_uri, &signing_key).await
}

/// Connect to `server_uri` and authenticate as the holder of `signing_key`.
///
/// Returns the socket once the server has sent `CONNECTED`.
pub async fn connect_with_key(
    server_uri: &str,
    signing_key: &SigningKey,
) -> Result<AuthenticatedSocket, WsClientError> {
    // Fails if a provider was installed already, which is fine.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let url = auth_url(server_uri, signing_key)
        .map_err(|e| WsClientError::Config(ConfigError::InvalidUri(e)))?;
    tracing::debug!("Connecting to {url}");

    // As per RFC6455 §4.1:
    // As this is not a browser client and does not match the semantics of one, we do not send
    // an |Origin| header field
    let (mut ws, _resp) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(WsClientError::Connection)?;

    socket_auth::authenticate(&mut ws, signing_key)
        .await
        .map_err(WsClientError::Authentication)?;

    Ok(ws)
}

/// `server_uri` with the identifier of `signing_key` appended as the `client_id` parameter.
pub fn auth_url(server_uri: &str, signing_key: &SigningKey) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(server_uri)?;
    let client_id = keys::client_id(signing_key);
    url.query_pairs_mut()
        .append_pair(CLIENT_ID_PARAM, &client_id.to_string());
    Ok(url)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn auth_url_carries_client_id() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let url = auth_url("ws://127.0.0.1:8000/auth", &key).unwrap();

        let (name, value) = url.query_pairs().next().unwrap();
        assert_eq!(name, CLIENT_ID_PARAM);
        assert_eq!(value, keys::client_id(&key).to_string());
        // `$` must be escaped in the query string.
        assert!(!url.query().unwrap().contains('$'));
        assert_eq!(url.path(), "/auth");
    }

    #[test]
    fn bad_uri() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        assert!(auth_url("not a uri", &key).is_err());
    }
}
