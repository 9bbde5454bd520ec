//! TRIGA Reactor Simulator - Main Entry Point
//!
//! Usage: `triga-simulator [config.json] [seconds] [time-speed]`

use std::env;

use anyhow::{Context, Result};
use triga_simulator_lib::config::load_config_or_default;
use triga_simulator_lib::{run_simulation, RunOptions};

const CONFIG_CANDIDATES: [&str; 2] = ["triga.json", "config/triga.json"];

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let mut args = env::args().skip(1);

    let config = match args.next() {
        Some(path) => load_config_or_default(&[path]),
        None => load_config_or_default(&CONFIG_CANDIDATES),
    };

    let mut options = RunOptions::default();
    if let Some(seconds) = args.next() {
        options.duration_seconds = seconds
            .parse()
            .with_context(|| format!("invalid duration in seconds: {seconds}"))?;
    }
    if let Some(speed) = args.next() {
        options.time_speed = speed
            .parse()
            .with_context(|| format!("invalid time speed: {speed}"))?;
    }

    let report = run_simulation(config, options).await?;

    let state_json =
        serde_json::to_string_pretty(&report.final_state).context("failed to serialize final state")?;
    log::info!("Final reactor state:\n{state_json}");
    log::info!(
        "Peak power {:.1} W over {} trace samples; display shows {} W, {} packets received",
        report.trace.peak_power(),
        report.trace.len(),
        report.display.power_watts,
        report.packets_received
    );

    Ok(())
}
