mod config;
mod db;
mod gateway;
mod instance;
mod schedule;
mod squad;
mod timezone;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::config::Config;
use crate::gateway::ChatClient;
use crate::instance::InstanceRegistry;
use crate::squad::SquadService;
use crate::timezone::TimezoneProvider;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    utils::logging::init_tracing(&config.logging.level, &config.logging.format);
    info!("Starting squad-keeper");

    let registry = InstanceRegistry::new(PathBuf::from(&config.storage.data_dir))
        .context("Failed to open the data directory")?;
    registry
        .load_existing()
        .context("Failed to load existing communities")?;

    let timezones = Arc::new(
        TimezoneProvider::new(PathBuf::from(&config.storage.tzdata_dir))
            .context("Failed to prepare the timezone mirror")?,
    );
    let gateway = ChatClient::new();
    let service = SquadService::new(gateway, timezones.clone());

    let mut ticker = tokio::time::interval(Duration::from_millis(config.scheduler.tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Scheduler ticking every {}ms", config.scheduler.tick_ms);

    loop {
        ticker.tick().await;
        for instance in registry.loaded() {
            if let Err(e) = service.on_tick(&instance).await {
                error!("Tick for community {} failed: {}", instance.id(), e);
            }
        }
        registry.persist_all();
        timezones.refresh_if_due().await;
    }
}
