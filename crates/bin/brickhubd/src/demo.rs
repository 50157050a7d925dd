//! Demo hub behaviour built from `[[hubs]]` entries.
//!
//! Every hub gets its button and status light. Pressing the button steps
//! the light through a colour cycle. A hub with a `motor_port` runs that
//! motor for the length of its routine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use brickhub_adapter_virtual::{SimulatedHub, VirtualTransport};
use brickhub_app::hub::{Hub, HubType};
use brickhub_domain::error::BrickError;
use brickhub_domain::event::DecodedEvent;
use brickhub_domain::peripheral::{PeripheralKind, PeripheralSpec};

use crate::config::HubConfig;

pub const BUTTON: &str = "button";
pub const LED: &str = "led";
pub const MOTOR: &str = "motor";

/// LWP3 colour indices: blue, green, yellow, orange, red, white.
const LED_CYCLE: [u8; 6] = [3, 6, 7, 8, 9, 10];
const MOTOR_POWER: i8 = 50;

/// Hub type for one configured hub.
///
/// # Errors
///
/// Returns a configuration error when a peripheral declaration is invalid.
pub fn hub_type(hub: &HubConfig) -> Result<Arc<HubType>, BrickError> {
    let step = Arc::new(AtomicUsize::new(0));
    let mut builder = HubType::builder(&hub.name, hub.kind)
        .attach(
            PeripheralSpec::builder(PeripheralKind::Button)
                .name(BUTTON)
                .capability("sense_press")
                .build()?,
        )
        .attach(PeripheralSpec::builder(PeripheralKind::Led).name(LED).build()?)
        .on_change(BUTTON, move |hub, event| {
            let step = Arc::clone(&step);
            async move { on_button(&hub, &event, &step) }
        });

    if let Some(ble_name) = &hub.ble_name {
        builder = builder.ble_name(ble_name);
    }
    if let Some(port) = hub.motor_port {
        builder = builder.attach(
            PeripheralSpec::builder(PeripheralKind::ExternalMotor)
                .name(MOTOR)
                .port(port)
                .build()?,
        );
    }

    let run_for = Duration::from_secs(hub.run_secs);
    Ok(builder
        .run(move |hub, cancel| drive(hub, cancel, run_for))
        .build())
}

fn on_button(hub: &Hub, event: &DecodedEvent, step: &AtomicUsize) {
    if event.value.as_bool() != Some(true) {
        return;
    }
    let color = LED_CYCLE[step.fetch_add(1, Ordering::Relaxed) % LED_CYCLE.len()];
    tracing::info!(hub = %hub.name(), color, "button pressed");
    if let Some(led) = hub.peripheral(LED)
        && let Err(err) = led.set_color(color)
    {
        tracing::warn!(hub = %hub.name(), error = %err, "unable to change light colour");
    }
}

async fn drive(
    hub: Arc<Hub>,
    cancel: CancellationToken,
    run_for: Duration,
) -> Result<(), BrickError> {
    let motor = hub.peripheral(MOTOR).cloned();
    if let Some(motor) = &motor {
        motor.set_speed(MOTOR_POWER)?;
    }

    tokio::select! {
        () = cancel.cancelled() => tracing::debug!(hub = %hub.name(), "routine cancelled"),
        () = tokio::time::sleep(run_for) => tracing::info!(hub = %hub.name(), "routine done"),
    }

    if let Some(motor) = &motor
        && let Err(err) = motor.set_speed(0)
    {
        tracing::warn!(hub = %hub.name(), error = %err, "unable to stop motor");
    }
    Ok(())
}

/// Address given to the `index`-th simulated hub when none is configured.
#[must_use]
pub fn virtual_address(index: usize) -> String {
    format!("90:84:2B:00:00:{:02X}", index + 1)
}

/// Simulated hubs matching `hubs`, each pressing its button `press_after`
/// once subscribed.
#[must_use]
pub fn simulated_transport(hubs: &[HubConfig], press_after: Duration) -> VirtualTransport {
    let simulated = hubs
        .iter()
        .enumerate()
        .map(|(index, hub)| {
            let address = hub.address.clone().unwrap_or_else(|| virtual_address(index));
            let simulated = SimulatedHub::new(hub.kind, address);
            match &hub.ble_name {
                Some(name) => simulated.named(name),
                None => simulated,
            }
        })
        .collect();
    VirtualTransport::new(simulated).with_button_press_after(press_after)
}
