//! Dynamic upstream pool manager.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │               DYNAMIC UPSTREAM                    │
//!                        │                                                   │
//!   GET /dynamic?...     │  ┌─────────┐    ┌──────────┐    ┌─────────────┐  │
//!   ─────────────────────┼─▶│  admin  │───▶│ registry │───▶│  upstream   │  │
//!                        │  │  query  │    │ (name →  │    │   engine    │  │
//!                        │  └─────────┘    │   pool)  │    │ add/remove/ │  │
//!                        │                 └──────────┘    │ update/sync │  │
//!                        │                                 └──────┬──────┘  │
//!                        │  ┌─────────┐    ┌──────────┐           │         │
//!                        │  │  tasks  │───▶│ resolver │◀──────────┤         │
//!                        │  │ sync +  │    └──────────┘           ▼         │
//!                        │  │ reclaim │                    ┌─────────────┐  │
//!                        │  └────┬────┘                    │ zone +      │  │
//!                        │       └──────────▶ state file   │ reclaimer   │  │
//!                        │                                 └─────────────┘  │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use dynamic_upstream::admin::{self, AdminState};
use dynamic_upstream::config::{load_config, UpstreamManagerConfig};
use dynamic_upstream::lifecycle::signals::wait_for_shutdown_signal;
use dynamic_upstream::lifecycle::startup::restore_state_files;
use dynamic_upstream::lifecycle::Shutdown;
use dynamic_upstream::observability::{logging, metrics};
use dynamic_upstream::registry::UpstreamRegistry;
use dynamic_upstream::resolver::SystemResolver;
use dynamic_upstream::tasks::{ReclaimSweeper, SyncDriver};
use dynamic_upstream::upstream::{Engine, Reclaimer};

#[derive(Parser)]
#[command(name = "dynamic-upstream")]
#[command(about = "Runtime-managed upstream peer pools", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => UpstreamManagerConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        upstreams = config.upstreams.len(),
        "dynamic-upstream starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let reclaimer = Arc::new(Reclaimer::new());
    let engine = Arc::new(Engine::new(Arc::new(SystemResolver::new())));
    let registry = Arc::new(UpstreamRegistry::from_config(
        &config.upstreams,
        &engine,
        reclaimer.clone(),
    )?);

    let restored = restore_state_files(&registry, &engine)?;
    tracing::info!(restored, "State files restored");

    let shutdown = Shutdown::new();

    let driver = SyncDriver::new(
        registry.clone(),
        engine.clone(),
        Duration::from_millis(config.dynamic.tick_ms),
    );
    let driver_handle = tokio::spawn(driver.run(shutdown.subscribe()));

    let sweeper = ReclaimSweeper::new(
        reclaimer.clone(),
        Duration::from_millis(config.dynamic.reclaim_interval_ms),
    );
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.subscribe()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Query interface listening");

    let state = AdminState::new(registry.clone(), engine.clone(), config.admin.api_key.clone());
    let server_handle = tokio::spawn(admin::serve(listener, state, shutdown.subscribe()));

    wait_for_shutdown_signal().await;
    shutdown.trigger();

    match server_handle.await {
        Ok(Err(e)) => tracing::error!(error = %e, "Query interface failed"),
        Err(e) => tracing::error!(error = %e, "Query interface task panicked"),
        Ok(Ok(())) => {}
    }
    let _ = driver_handle.await;
    let _ = sweeper_handle.await;

    let leaked = reclaimer.shutdown();
    tracing::info!(leaked, "Shutdown complete");
    Ok(())
}
