//! # brickhubd: brickhub daemon
//!
//! Composition root that wires a transport, the LWP3 codec and the
//! configured hubs together, then runs them to completion.
//!
//! ## Responsibilities
//! - Load configuration (`brickhub.toml`, environment overrides)
//! - Install the `tracing` subscriber
//! - Pick the transport backend: inline BLE, queued BLE, or virtual hubs
//! - Cancel the run on SIGINT/SIGTERM/SIGQUIT
//! - Declare the demo hub types and hand them to the orchestrator
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no protocol or lifecycle logic belongs here.

mod config;
mod demo;
mod shutdown;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use brickhub_adapter_ble::BleBackend;
use brickhub_adapter_lwp3::Lwp3Codec;
use brickhub_app::orchestrator::{Orchestrator, RunReport};
use brickhub_app::ports::TransportAdapter;
use brickhub_domain::error::BrickError;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();
    tracing::info!(
        backend = %config.transport.backend,
        hubs = config.hubs.len(),
        "starting brickhubd"
    );

    let root = CancellationToken::new();
    tokio::spawn(shutdown::cancel_on_signal(root.clone()));

    let report = match config.ble_config() {
        Some(ble) => run(Arc::new(BleBackend::from_config(&ble)), &config, root.clone()).await,
        None => {
            let transport = demo::simulated_transport(&config.hubs, config.button_press_after());
            run(Arc::new(transport), &config, root.clone()).await
        }
    };
    root.cancel();

    let report = report?;
    for hub in &report.completed {
        tracing::info!(%hub, "hub finished");
    }
    for (hub, err) in &report.failed {
        tracing::error!(%hub, error = %err, "hub failed");
    }
    if report.cancelled {
        tracing::info!("run cancelled");
    }
    if !report.is_success() {
        return Err(format!("{} hub(s) failed", report.failed.len()).into());
    }
    Ok(())
}

async fn run<T>(
    transport: T,
    config: &Config,
    root: CancellationToken,
) -> Result<RunReport, BrickError>
where
    T: TransportAdapter + Clone + 'static,
{
    let simulated = config.ble_config().is_none();
    let hub_types = config
        .hubs
        .iter()
        .map(|hub| demo::hub_type(hub).map(|hub_type| (hub, hub_type)))
        .collect::<Result<Vec<_>, _>>()?;

    Orchestrator::new(transport, Arc::new(Lwp3Codec::new()))
        .with_config(config.connect_config())
        .with_cancellation(root)
        .run(|context| async move {
            for (index, (hub, hub_type)) in hub_types.iter().enumerate() {
                let address = hub
                    .address
                    .clone()
                    .or_else(|| simulated.then(|| demo::virtual_address(index)));
                let mut builder = context.hub(hub_type).name(&hub.name);
                if let Some(address) = address {
                    builder = builder.address(address);
                }
                builder.build()?;
            }
            Ok(())
        })
        .await
}
