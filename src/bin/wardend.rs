//! warden daemon - RCON fleet supervisor and moderator push hub
//!
//! # Usage
//!
//! ```bash
//! # Validate a config file and print the fleet it describes
//! wardend --config /etc/warden/warden.toml check
//!
//! # Run the moderator push hub
//! WARDEN_CONFIG=./warden.toml wardend hub
//!
//! # Enable debug logging
//! RUST_LOG=wardend=debug wardend hub
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use warden_core::{Game, Server};
use wardend::config::{Config, CONFIG_ENV, DEFAULT_CONFIG_PATH};
use wardend::rcon::{ClientFactory, RconClient, RconError};
use wardend::Daemon;

/// warden daemon - game server moderation backend
#[derive(Parser, Debug)]
#[command(name = "wardend", version, about)]
struct Args {
    /// Config file (defaults to $WARDEN_CONFIG, then /etc/warden/warden.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the config file and print a fleet summary
    Check,
    /// Run the moderator push hub
    Hub,
}

fn config_path(args: &Args) -> PathBuf {
    args.config
        .clone()
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let path = config_path(&args);
    let config =
        Config::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;

    match args.command {
        Command::Check => {
            print_summary(&config);
            Ok(())
        }
        Command::Hub => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            runtime.block_on(run_hub(config))
        }
    }
}

fn print_summary(config: &Config) {
    println!("Config OK");
    println!("  games:   {}", config.games.len());
    println!("  servers: {}", config.servers.len());
    for server in &config.servers {
        let rcon = config
            .games
            .get(&server.game)
            .map(|g| if g.use_rcon { "rcon" } else { "no rcon" })
            .unwrap_or("unknown game");
        println!(
            "    [{}] {} ({}) game={} {}",
            server.id,
            server.display_name(),
            server.address,
            server.game,
            rcon
        );
    }
    println!("  hub:     {} (user header: {})", config.hub.bind, config.hub.user_header);
}

/// Factory for hub-only runs; no RCON transport is linked into this binary.
struct DetachedFactory;

impl ClientFactory for DetachedFactory {
    fn create(&self, _game: &Game, server: &Server) -> Result<Arc<dyn RconClient>, RconError> {
        Err(RconError::Protocol(format!(
            "no RCON transport available for {}",
            server.address
        )))
    }
}

/// Runs the push hub with the event bridge (async entry point).
async fn run_hub(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("wardend=info".parse()?)
                .add_directive("warden_core=info".parse()?)
                .add_directive("warden_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "warden hub starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let daemon = Daemon::new(config, Arc::new(DetachedFactory), cancel_token)
        .context("Failed to wire daemon")?;

    let result = daemon.serve_hub().await.context("Failed to start hub server");
    daemon.shutdown().await;

    info!("warden hub stopped");
    result
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
