use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use staffroom_core::Kiosk;
use staffroom_store::SqliteStore;

mod config;
mod dbus_interface;
mod engine;

use config::{BusKind, Config};
use dbus_interface::{KioskService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("staffroomd starting");

    let config = Config::load().context("loading configuration")?;

    // Open the store up front so a bad database path fails at startup.
    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    tracing::info!(path = %config.db_path.display(), "identity store opened");

    let kiosk = Kiosk::new(store, config.places())
        .with_threshold(config.match_threshold)
        .with_prompt_timeout(config.prompt_timeout());
    tracing::info!(
        threshold = config.match_threshold,
        room = %kiosk.places().room(),
        destinations = kiosk.places().destinations().len(),
        "kiosk configured"
    );

    let engine = engine::spawn_engine(kiosk)?;
    let service = KioskService::new(engine, config.db_path.display().to_string());

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "staffroomd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("staffroomd shutting down");

    Ok(())
}
