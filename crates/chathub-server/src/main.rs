use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

mod channels;
mod config;
mod credentials;
mod settings;
mod state;
mod text;
mod voice;

use channels::ChannelRegistry;
use config::ServerConfig;
use credentials::CredentialStore;
use settings::ServerSettings;
use state::ServerState;

#[derive(Parser)]
#[command(name = "chathub-server", about = "Chat hub text and voice server")]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Text control-plane port, overrides config
    #[arg(long)]
    text_port: Option<u16>,

    /// Voice data-plane port, overrides config
    #[arg(long)]
    voice_port: Option<u16>,

    /// Bind address (IP), overrides config
    #[arg(long)]
    host: Option<String>,

    /// Path to server settings file (JSON), overrides config
    #[arg(long)]
    settings: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chathub_server=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file: {}", config_path))?;
        toml::from_str(&content)?
    } else {
        ServerConfig::default()
    };

    if let Some(port) = args.text_port {
        config.text_port = port;
    }
    if let Some(port) = args.voice_port {
        config.voice_port = port;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(settings_path) = args.settings {
        config.settings_file = Some(settings_path);
    }

    let settings = Arc::new(match &config.settings_file {
        Some(path) => ServerSettings::load_from_file(std::path::Path::new(path))
            .with_context(|| format!("failed to load settings: {}", path))?,
        None if std::path::Path::new("server_settings.json").exists() => {
            ServerSettings::load_from_file(std::path::Path::new("server_settings.json"))
                .context("failed to load server_settings.json")?
        }
        None => ServerSettings::default(),
    });

    let credentials = Arc::new(CredentialStore::load(config.users_file.clone(), &settings));
    let channels = Arc::new(ChannelRegistry::load(config.channels_file.clone(), &settings));
    let state = Arc::new(ServerState::new());

    let text_listener = TcpListener::bind(format!("{}:{}", config.host, config.text_port))
        .await
        .with_context(|| {
            format!(
                "failed to bind text listener on {}:{}",
                config.host, config.text_port
            )
        })?;
    let voice_listener = TcpListener::bind(format!("{}:{}", config.host, config.voice_port))
        .await
        .with_context(|| {
            format!(
                "failed to bind voice listener on {}:{}",
                config.host, config.voice_port
            )
        })?;

    info!(
        host = %config.host,
        text_port = config.text_port,
        voice_port = config.voice_port,
        registered_users = credentials.user_count(),
        channels = ?channels.list(),
        "chathub server ready, accepting connections",
    );

    let _voice_task = {
        let state = state.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            loop {
                let (stream, peer) = match voice_listener.accept().await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("voice accept error: {}", e);
                        continue;
                    }
                };
                let state = state.clone();
                let settings = settings.clone();
                tokio::spawn(async move {
                    let _ = peer;
                    voice::handle_connection(stream, state, settings).await;
                });
            }
        })
    };

    loop {
        let (stream, peer_addr) = match text_listener.accept().await {
            Ok(result) => result,
            Err(e) => {
                error!("text accept error: {}", e);
                continue;
            }
        };

        let state = state.clone();
        let credentials = credentials.clone();
        let channels = channels.clone();

        tokio::spawn(async move {
            let _ = peer_addr;
            text::handle_connection(stream, state, credentials, channels).await;
        });
    }
}
