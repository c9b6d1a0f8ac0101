//! `CitizenLink` bot
//!
//! Serves the Discord interactions endpoint for RSI handle verification.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::task::TaskTracker;
use tracing::info;

use citizenlink_bot::discord::DiscordClient;
use citizenlink_bot::routes::{AppState, build_router};
use citizenlink_bot::signature::SignatureVerifier;
use citizenlink_core::config::load_config;
use citizenlink_core::tracing_init::{default_filter, init_tracing};
use citizenlink_core::{MemoryChallengeStore, VerificationEngine};

#[derive(Parser, Debug)]
#[command(name = "citizenlink-bot")]
#[command(version, about = "CitizenLink - RSI handle verification for Discord")]
struct Args {
    /// Settings file (defaults to the global `citizenlink/settings.json`)
    #[arg(long, env = "CITIZENLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding token.txt, channel.txt, roles.txt and cacert.pem
    #[arg(long, env = "CITIZENLINK_BOT_ITEMS_DIR")]
    bot_items_dir: Option<PathBuf>,

    /// Listen address for the interactions endpoint
    #[arg(long, env = "CITIZENLINK_ADDR")]
    addr: Option<SocketAddr>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, env = "CITIZENLINK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "CITIZENLINK_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref(), args.bot_items_dir.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(level) = args.log_level {
        config.server.log_level = level;
    }
    config.server.log_json |= args.log_json;

    init_tracing(
        &default_filter("citizenlink_bot", &config.server.log_level),
        config.server.log_json,
    );
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.addr,
        pending_role = %config.roles.pending,
        verified_role = %config.roles.verified,
        ca_bundle = config.profile.ca_bundle.is_some(),
        "Starting citizenlink-bot"
    );

    let engine = Arc::new(VerificationEngine::from_config(
        &config,
        Arc::new(MemoryChallengeStore::new()),
    )?);
    let state = AppState {
        engine: Arc::clone(&engine),
        discord: Arc::new(DiscordClient::new(&config.discord)?),
        verifier: Arc::new(SignatureVerifier::from_hex(&config.discord.public_key)?),
        tasks: TaskTracker::new(),
    };
    let tasks = state.tasks.clone();

    let listener = tokio::net::TcpListener::bind(config.server.addr).await?;
    info!(addr = %config.server.addr, "Interactions endpoint ready");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight commands may still schedule revocations, so drain them first.
    tasks.close();
    tasks.wait().await;
    engine.shutdown().await;

    info!("Bot stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        () = sigterm => {
            info!("Received SIGTERM shutdown signal");
        }
    }
}
