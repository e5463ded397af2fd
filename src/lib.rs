pub mod capture;
pub mod clock;
pub mod control;
pub mod db;
pub mod digest;
pub mod error;
pub mod providers;
pub mod settings;
pub mod summary;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::{info, warn};

use clock::SystemClock;
use control::{AgentController, Collaborators};
use db::Database;
use settings::SettingsStore;

pub use error::LifelogError;

const DATA_DIR_ENV: &str = "LIFELOG_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "data";

fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Runs the agent until ctrl-c. On unix, SIGHUP reloads `settings.json`.
pub async fn run() -> Result<()> {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("lifelog starting up...");

    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings = Arc::new(SettingsStore::new(data_dir.join("settings.json"))?);
    let database = Database::new(data_dir.join("lifelog.sqlite3"))?;
    info!("store opened at {}", database.path().display());

    match database.latest_watermark().await {
        Ok(watermark) => info!("resuming from watermark {watermark}"),
        Err(err) => warn!("could not read watermark at startup: {err:#}"),
    }

    let collaborators = Collaborators::from_commands(&settings, &data_dir.join("media"));
    let controller = AgentController::new(
        database.clone(),
        Arc::clone(&settings),
        Arc::new(SystemClock),
        collaborators,
    );

    controller.start().await;
    wait_for_shutdown(&settings).await?;

    info!("shutting down...");
    controller.stop().await?;
    database.shutdown();
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(settings: &SettingsStore) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                return result.context("failed to listen for ctrl-c");
            }
            _ = hangup.recv() => reload_settings(settings),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_settings: &SettingsStore) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")
}

#[cfg_attr(not(unix), allow(dead_code))]
fn reload_settings(settings: &SettingsStore) {
    match settings.reload() {
        Ok(()) => info!("settings reloaded from {}", settings.path().display()),
        Err(err) => warn!("settings reload failed, keeping current settings: {err:#}"),
    }
}
