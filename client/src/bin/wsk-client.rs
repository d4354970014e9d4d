use clap::Parser;
use futures_util::StreamExt;
use miette::{IntoDiagnostic, WrapErr};
use std::path::PathBuf;
use tokio_tungstenite::tungstenite::Message;
use wsk_client::keys;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Connect to a server and authenticate, then stay connected until the server hangs up.
    Connect {
        /// PKCS#8 PEM private key.
        #[arg(long, env = "WSK_CLIENT_KEY")]
        key: PathBuf,
        /// Authentication endpoint, e.g. ws://127.0.0.1:8000/auth
        uri: String,
    },
    /// Print the client identifier for a key.
    Identify {
        #[arg(long, env = "WSK_CLIENT_KEY")]
        key: PathBuf,
    },
    /// Generate a fresh P-256 key and write it as PKCS#8 PEM.
    GenerateKey { path: PathBuf },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt::init();

    if let Err(e) = run(args.command).await {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> miette::Result<()> {
    match command {
        Command::Connect { key, uri } => {
            let config = wsk_client::WsClientConfig {
                private_key: key,
                server_uri: uri,
            };
            let mut ws = wsk_client::connect(&config)
                .await
                .into_diagnostic()
                .wrap_err("failed to connect")?;
            println!("connected");
            while let Some(m) = ws.next().await {
                match m.into_diagnostic()? {
                    Message::Close(_) => break,
                    other => tracing::info!("received {other:?}"),
                }
            }
            Ok(())
        }
        Command::Identify { key } => {
            let key = keys::load_signing_key(&key).into_diagnostic()?;
            println!("{}", keys::client_id(&key));
            Ok(())
        }
        Command::GenerateKey { path } => {
            let key = keys::generate_signing_key();
            keys::write_signing_key(&path, &key).into_diagnostic()?;
            println!("{}", keys::client_id(&key));
            Ok(())
        }
    }
}
