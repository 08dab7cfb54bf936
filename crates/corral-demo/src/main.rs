#![doc = include_str!("../README.md")]

mod config;
mod inventory;
mod load;
mod telemetry;

use clap::Parser;
use config::{CliArgs, DemoConfig, Scenario};
use telemetry::init_telemetry;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = DemoConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    if matches!(config.scenario, Scenario::Inventory | Scenario::All) {
        inventory::run(&config.inventory);
    }

    if matches!(config.scenario, Scenario::Pool | Scenario::All) {
        let report = load::run(&config.load)?;
        tracing::info!(
            submitted = report.submitted,
            rejected = report.rejected,
            completed = report.completed,
            largest = report.largest_pool_size,
            "Load report"
        );
    }

    Ok(())
}

fn log_startup_info(config: &DemoConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting corral demo with full config: {config:#?}");
    } else {
        tracing::info!(
            "Starting corral demo ({:?}) with {}..{} workers",
            config.scenario,
            config.load.pool.core_size,
            config.load.pool.max_size
        );
    }
}
