// src/main.rs

//! The main entry point for the vizier cron-script runner.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

use vizier_cron_runner::config::Config;
use vizier_cron_runner::core::bus::nats::NatsBusClient;
use vizier_cron_runner::{InMemoryCronStore, SyncScripts, UnavailableQueryExecClient};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("vizier-cron-runner version {VERSION}");
        return Ok(());
    }

    // Determine the configuration path. It can be provided via a --config
    // flag; otherwise, it defaults to "config.toml".
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    // Setup logging with reloading capabilities, matching the teacher's
    // pattern of allowing `RUST_LOG` to override the configured level.
    let initial_log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, _reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    info!(agent_id = %config.agent_id, "starting vizier cron-script runner");

    // The bus client talks to a real NATS-compatible transport; the cron
    // store and query-exec service wire formats live in the deploying
    // binary, so this process falls back to an in-memory store and an exec
    // client that reports every tick as unavailable until a real transport
    // is wired in.
    let bus = Arc::new(
        NatsBusClient::connect(&config.bus.url)
            .await
            .with_context(|| format!("failed to connect to bus at '{}'", config.bus.url))?,
    );
    let cron_store = InMemoryCronStore::new();
    let query_exec = Arc::new(UnavailableQueryExecClient);

    let coordinator = SyncScripts::start(bus, cron_store, query_exec, config.bus.request_deadline())
        .await
        .context("failed to start cron-script coordinator")?;

    info!("cron-script runner started; awaiting shutdown signal");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install ctrl-c handler");
    }

    info!("shutdown signal received; draining in-flight work");
    coordinator.shutdown().await;
    info!("shutdown complete");

    Ok(())
}
