//! OBD Monitor - Main Entry Point
//!
//! Connects to the configured adapter, prints stored trouble codes, then
//! polls until Ctrl-C and writes safety events, protective action requests
//! and tuning adjustments to stdout as JSON lines. On exit it prints the
//! tuning report and a component health report.

use anyhow::Context;
use session::{init_logging, SessionConfig, VehicleSession};
use std::path::PathBuf;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SessionConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&config.logging)?;

    info!("=== OBD Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let mut session = VehicleSession::connect(config)
        .await
        .context("connecting to adapter")?;
    info!("{}", session.status_message());

    match session.read_dtcs().await {
        Ok(report) => println!("{}", serde_json::to_string(&report)?),
        Err(err) => warn!("Could not read trouble codes: {}", err),
    }

    let mut events = session.subscribe_safety_events();
    let mut actions = session.subscribe_protective_actions();
    let mut adjustments = session.subscribe_adjustments();
    let mut status = session.subscribe_status();

    session.start_polling()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            Some(event) = events.recv() => println!("{}", serde_json::to_string(&event)?),
            Some(action) = actions.recv() => println!("{}", serde_json::to_string(&action)?),
            Some(adjustment) = adjustments.recv() => println!("{}", serde_json::to_string(&adjustment)?),
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                info!("{}", current.message());
                if !current.is_connected() {
                    break;
                }
            }
        }
    }

    if let Some(report) = session.tuning_report() {
        println!("{}", serde_json::to_string(&report)?);
    }
    println!("{}", serde_json::to_string(&session.health_report())?);
    session.disconnect().await;
    Ok(())
}
