//! hydro controller
//!
//! Usage: `hydro [config.yaml]` (defaults to `hydro.yaml`). Log level is
//! taken from `RUST_LOG`, `info` otherwise.

mod system;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hydro_config::load_config;
use hydro_core::SystemClock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::system::Hydro;

const DEFAULT_CONFIG: &str = "hydro.yaml";

/// How often the main task checks that both workers are still alive
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    info!(config = %path, "Starting hydro");

    let config = load_config(&path).with_context(|| format!("loading {path}"))?;
    let mut hydro = Hydro::from_config(&config, Arc::new(SystemClock))?;
    hydro.start().context("starting controller")?;
    info!(controller = %config.name, "hydro is running");

    let mut health = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutting down...");
                break;
            }
            _ = health.tick() => {
                if !hydro.is_healthy() {
                    warn!("A worker thread exited, shutting down");
                    break;
                }
            }
        }
    }

    // Joining the workers blocks
    let (hydro, result) = tokio::task::spawn_blocking(move || {
        let result = hydro.stop();
        (hydro, result)
    })
    .await?;

    let stats = hydro.dispatch_stats();
    info!(
        executed = stats.executed,
        failed = stats.failed,
        panicked = stats.panicked,
        "Controller stopped"
    );
    if let Err(e) = result {
        error!(error = %e, "Controller reported an error");
        return Err(e.into());
    }
    Ok(())
}
