use crate::config::ServerConfig;
use miette::{IntoDiagnostic, WrapErr};
use std::net::SocketAddr;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

pub struct AppStateInner {
    config: ServerConfig,
}
impl AppStateInner {
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[derive(Clone)]
pub struct AppState(Arc<AppStateInner>);
impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        AppState(Arc::new(AppStateInner { config }))
    }
}
impl Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(clap::Args, Debug)]
pub struct ServeCommand {
    #[arg(short = 'c', long = "config", env = "WSK_CFG_FILE")]
    config: Option<PathBuf>,
}

pub async fn serve(serve_command: ServeCommand) -> miette::Result<()> {
    let xdg_basedirs = xdg::BaseDirectories::with_prefix("wsk_server")
        .into_diagnostic()
        .wrap_err("failed to locate XDG base directories")?;
    let config =
        super::config::load_configuration(serve_command.config.as_deref(), &xdg_basedirs)?;

    if config.log.use_tokio_console_subscriber {
        console_subscriber::init();
    } else {
        // Note: this is DIFFERENT from `tracing_subscriber::fmt().init()`
        tracing_subscriber::fmt::init();
    }

    let bind_address = config.server.bind_address;
    let tls_config = config.server.testing_only_tls_config.clone();

    let app_state = AppState::new(config);
    let router = super::routes::build_router(app_state);

    enum Server {
        PlainHttp(axum_server::Server),
        Tls(axum_server::Server<axum_server::tls_rustls::RustlsAcceptor>),
    }

    let server = match tls_config {
        None => Server::PlainHttp(axum_server::bind(bind_address)),
        Some(tls) => {
            let rustls_config =
                axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                    .await
                    .into_diagnostic()
                    .wrap_err("Failed to load RusTls configuration for public server")?;
            let server = axum_server::bind_rustls(bind_address, rustls_config);

            tracing::warn!(
                "-- WARNING -- DEVELOPMENT-ONLY TLS MODE IS ENABLED. PLEASE DO NOT USE THIS IN PRODUCTION."
            );

            Server::Tls(server)
        }
    };
    tracing::info!("Bound server to {bind_address}");

    match server {
        Server::PlainHttp(server) => {
            server
                .serve(router.into_make_service_with_connect_info::<SocketAddr>())
                .await
        }
        Server::Tls(server) => {
            server
                .serve(router.into_make_service_with_connect_info::<SocketAddr>())
                .await
        }
    }
    .into_diagnostic()
    .wrap_err("(server exited)")
}
