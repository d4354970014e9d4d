use miette::{IntoDiagnostic, WrapErr};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use wskeyid_rs::handshake::HandshakeConfig;
use xdg::BaseDirectories;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Configuration of the HTTP server.
    pub server: HttpConfig,
    /// Hardening options for the authentication handshake. All off by default.
    #[serde(default)]
    pub handshake: HandshakeConfig,
    /// Configuration of server logging.
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Socket address to bind to.
    pub bind_address: SocketAddr,
    /// Optional TLS mode for testing only.
    pub testing_only_tls_config: Option<TestingOnlyTlsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestingOnlyTlsConfig {
    /// Public key (for TLS).
    pub cert: PathBuf,
    /// Private key (for TLS).
    pub key: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Whether to include `console-subscriber`.
    #[serde(default)]
    pub use_tokio_console_subscriber: bool,
}

/// Load the server configuration.
///
/// Uses `path` if given and present, and otherwise searches for `wsk_server/config.toml` in the
/// XDG configuration directories.
pub fn load_configuration(
    path: Option<&Path>,
    xdg_basedirs: &BaseDirectories,
) -> miette::Result<ServerConfig> {
    let path = path
        .and_then(|p| {
            if p.exists() {
                Some(p.to_path_buf())
            } else {
                tracing::warn!(
                    "Specified configuration file '{}' does not exist",
                    p.display()
                );
                None
            }
        })
        .ok_or(())
        .or_else(|()| {
            tracing::warn!("Searching for wsk_server/config.toml in XDG configuration directories.");
            xdg_basedirs
                .find_config_file("config.toml")
                .ok_or(miette::miette!(
                    "couldn't find path to 'config.toml' in XDG config dirs"
                ))
        })?;

    extract_configuration(&path)
}

/// Read the configuration from the TOML file at `path`, overlaid with `WSK_`-prefixed
/// environment variables (`__` separates nested keys, e.g. `WSK_SERVER__BIND_ADDRESS`).
pub fn extract_configuration(path: &Path) -> miette::Result<ServerConfig> {
    use figment::providers::{self, Format};
    figment::Figment::new()
        .merge(providers::Toml::file(path))
        .merge(providers::Env::prefixed("WSK_").split("__"))
        .extract()
        .into_diagnostic()
        .wrap_err("Failed to extract server configuration")
}
