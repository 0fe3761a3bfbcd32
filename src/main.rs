// testrig daemon: builds the engine around the chromiumoxide driver and
// keeps it alive until the host asks for a graceful shutdown. Transport
// adapters (HTTP/SignalR) attach to the engine handle in-process.

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use testrig::{ChromiumDriver, Engine, EngineConfig};

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn config_from_env() -> EngineConfig {
    let mut config = EngineConfig::default()
        .with_max_concurrent_requests(env_usize("TESTRIG_MAX_REQUESTS", 8))
        .with_max_active_browsers(env_usize("TESTRIG_MAX_BROWSERS", 4))
        .with_max_concurrent_io(env_usize("TESTRIG_MAX_IO", 16))
        .with_admission_timeout(Duration::from_millis(
            env_usize("TESTRIG_ADMISSION_TIMEOUT_MS", 0) as u64,
        ));
    if let Ok(dir) = std::env::var("TESTRIG_LOG_DIR") {
        config = config.with_log_dir(PathBuf::from(dir));
    }
    if let Ok(path) = std::env::var("TESTRIG_ACCOUNTS") {
        config = config.with_account_store_path(PathBuf::from(path));
    }
    if let Ok(value) = std::env::var("TESTRIG_HEADLESS") {
        config = config.with_headless(value != "0" && value != "false");
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config_from_env();
    let headless = config.headless;
    info!(
        max_requests = config.max_concurrent_requests,
        max_browsers = config.max_active_browsers,
        "starting testrig engine"
    );

    let engine = Engine::new(config, ChromiumDriver::new(headless)).await?;

    info!("engine ready; waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;

    info!("shutdown signal received");
    engine.shutdown().await;
    Ok(())
}
