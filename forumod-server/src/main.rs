//! # forumod-server
//!
//! Process entry point for the forum moderation engine.
//!
//! Loads [`forumod_config::SystemConfig`] and the per-user rule roster,
//! opens the database pool, wires the event bus, and runs the crawler
//! orchestrator plus one dispatcher per enabled account until the
//! process receives a shutdown signal (`spec.md` §6 "Process lifecycle
//! signals"). The HTTP/REST surface, WebUI reverse proxy, QR-code login,
//! and plugin loader are out of scope (`spec.md` §1 Non-goals) — this
//! binary exposes only the `Application` object an external process
//! embedding that surface would drive.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use forumod_config::{ConfigLoader, UsersConfigLoader};
use forumod_core::Application;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments for the forum moderation engine.
#[derive(Parser, Debug)]
#[command(name = "forumod-server")]
#[command(about = "Automated moderation engine for a forum platform")]
struct Args {
    /// Path to the system config TOML file (scan parameters, database
    /// URL, cache TTLs).
    #[arg(long, env = "FORUMOD_CONFIG", default_value = "forumod.toml")]
    config: PathBuf,

    /// Path to the `[[user]] ...` TOML document describing the per-user
    /// moderator accounts and their rule sets.
    #[arg(long, env = "FORUMOD_USERS", default_value = "users.toml")]
    users: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load a .env file if present, same as the CLI-arg/env-var layering
    // the teacher uses for its own config.
    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forumod_server=info,forumod_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let system_config = match ConfigLoader::load(&args.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            warn!(
                path = %args.config.display(),
                error = %err,
                "no usable system config found, falling back to defaults"
            );
            forumod_config::SystemConfig::default()
        }
    };
    info!(database_url = %system_config.database.url, "system config loaded");

    let users = match UsersConfigLoader::load(&args.users) {
        Ok(users) => users,
        Err(err) => {
            warn!(
                path = %args.users.display(),
                error = %err,
                "no usable user roster found, starting with zero accounts"
            );
            Vec::new()
        }
    };
    info!(count = users.len(), "user roster loaded");

    // Opening the database is the first of the two fatal startup
    // conditions named in `spec.md` §7; an unreachable store aborts the
    // process rather than starting in a half-usable state.
    let app = match Application::bootstrap(system_config, users).await {
        Ok(app) => app,
        Err(err) => {
            error!(error = %err, "failed to open database, aborting startup");
            return Err(err.into());
        }
    };

    run_until_signal(app).await;
    Ok(())
}

/// Runs the application until SIGINT/SIGTERM, then drains gracefully
/// (`spec.md` §6: "broadcast `Stop`, cancel the spider, close the
/// moderator clients, close DB pool, exit").
async fn run_until_signal(app: Arc<Application>) {
    let run_handle = tokio::spawn(app.clone().run());

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");

    app.controller.stop().await;
    run_handle.abort();
    let _ = run_handle.await;

    info!("shutdown complete");
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
