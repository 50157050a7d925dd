//! Notification router: turns raw inbound bytes into peripheral signals.
//!
//! Each hub gets one router task. Backends hand bytes to the callback
//! returned by [`NotificationRouter::spawn`]; the task routes them one at a
//! time so events of a hub are observed in arrival order.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use brickhub_domain::error::BrickError;
use brickhub_domain::event::{DecodedEvent, EventKind};

use crate::hub::Hub;
use crate::peripheral::Peripheral;
use crate::ports::NotificationCallback;

/// Routes decoded events of one hub to its peripherals.
#[derive(Debug, Clone)]
pub struct NotificationRouter {
    hub: Weak<Hub>,
}

impl NotificationRouter {
    #[must_use]
    pub fn new(hub: &Arc<Hub>) -> Self {
        Self {
            hub: Arc::downgrade(hub),
        }
    }

    /// Start the routing task for `hub` and return the callback feeding it.
    ///
    /// The task stops when `cancel` fires or when every clone of the
    /// callback is gone.
    #[must_use]
    pub fn spawn(hub: &Arc<Hub>, cancel: CancellationToken) -> NotificationCallback {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Vec<u8>>();
        let router = Self::new(hub);
        let span = hub.base().span().clone();

        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        bytes = receiver.recv() => match bytes {
                            Some(bytes) => router.route(&bytes).await,
                            None => break,
                        },
                    }
                }
                tracing::debug!("notification router stopped");
            }
            .instrument(span),
        );

        Arc::new(move |bytes| {
            if sender.send(bytes).is_err() {
                tracing::trace!("notification after router shutdown");
            }
        })
    }

    /// Decode one frame and dispatch it. Undecodable frames and frames for
    /// ports without a declared peripheral are dropped.
    pub async fn route(&self, bytes: &[u8]) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };

        let event = match hub.codec().decode(bytes) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    hub = %hub,
                    error = %err,
                    bytes = ?bytes,
                    "dropping undecodable notification"
                );
                return;
            }
        };
        if event.kind == EventKind::Status {
            tracing::trace!(hub = %hub, port = %event.port, "status notification");
            return;
        }

        let Some(peripheral) = hub.peripheral_at(event.port) else {
            tracing::debug!(
                hub = %hub,
                port = %event.port,
                kind = ?event.kind,
                "no peripheral on port"
            );
            return;
        };

        if let Err(err) = dispatch(&hub, peripheral, &event).await {
            tracing::warn!(hub = %hub, peripheral = %peripheral, error = %err, "dispatch failed");
        }
    }
}

async fn dispatch(
    hub: &Hub,
    peripheral: &Peripheral,
    event: &DecodedEvent,
) -> Result<(), BrickError> {
    let capability = peripheral.record(event);

    match event.kind {
        EventKind::Attached { device_type } => {
            tracing::debug!(peripheral = %peripheral, device_type, "attached");
            if hub.is_linked()
                && let Err(err) = peripheral.activate()
            {
                tracing::warn!(
                    peripheral = %peripheral,
                    error = %err,
                    "unable to activate updates"
                );
            }
            peripheral.emit("attach", event).await?;
        }
        EventKind::Detached => {
            tracing::debug!(peripheral = %peripheral, "detached");
            peripheral.emit("detach", event).await?;
        }
        EventKind::Value | EventKind::Status => {}
    }

    peripheral.emit("change", event).await?;
    if let Some(capability) = capability {
        peripheral.emit(&capability.change_signal(), event).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use brickhub_domain::event::SensorValue;
    use brickhub_domain::hub::HubKind;
    use brickhub_domain::peripheral::{PeripheralKind, PeripheralSpec};

    use super::*;
    use crate::hub::{HubType, SetupContext};
    use crate::queue::OutboundQueue;
    use crate::signal::Handler;
    use crate::testing::{ScriptedTransport, TinyCodec};

    fn sensor_hub(log: &Arc<Mutex<Vec<String>>>) -> Arc<Hub> {
        let ctx = SetupContext::new(Arc::new(TinyCodec));
        let seen = Arc::clone(log);
        let hub_type = HubType::builder("rover", HubKind::Boost)
            .attach(
                PeripheralSpec::builder(PeripheralKind::VisionSensor)
                    .name("eye")
                    .port(1)
                    .capability("sense_distance")
                    .build()
                    .unwrap(),
            )
            .on_change("eye", move |_, event| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(format!("hub:{}", event.value));
                }
            })
            .build();
        ctx.hub(&hub_type).build().unwrap()
    }

    fn record(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Handler {
        let log = Arc::clone(log);
        Handler::immediate(move |_, _| log.lock().unwrap().push(label.to_owned()))
    }

    #[tokio::test]
    async fn should_emit_generic_then_capability_change() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = sensor_hub(&log);
        let eye = hub.peripheral("eye").unwrap();
        eye.connect("change::sense_distance", record(&log, "distance")).unwrap();

        hub.inject(&[4, 1, 1, 42]).await;

        assert_eq!(*log.lock().unwrap(), vec!["hub:42", "distance"]);
        assert_eq!(eye.value("sense_distance"), Some(SensorValue::Int(42)));
    }

    #[tokio::test]
    async fn should_emit_attach_before_change() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = sensor_hub(&log);
        let eye = hub.peripheral("eye").unwrap();
        eye.connect("attach", record(&log, "attach")).unwrap();

        hub.inject(&[3, 1, 0]).await;

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], "attach");
        assert!(log[1].starts_with("hub:"));
    }

    #[tokio::test]
    async fn should_drop_unknown_ports_and_garbage() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = sensor_hub(&log);

        hub.inject(&[4, 9, 1, 42]).await;
        hub.inject(&[1]).await;
        hub.inject(&[3, 1, 2]).await;

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_route_callback_bytes_in_arrival_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = sensor_hub(&log);
        let cancel = CancellationToken::new();
        let callback = NotificationRouter::spawn(&hub, cancel.clone());

        for value in 1..=5 {
            callback(vec![4, 1, 1, value]);
        }
        drop(callback);
        // let the router task drain
        for _ in 0..50 {
            if log.lock().unwrap().len() == 5 {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(
            *log.lock().unwrap(),
            vec!["hub:1", "hub:2", "hub:3", "hub:4", "hub:5"]
        );
        cancel.cancel();
    }

    #[tokio::test]
    async fn should_report_values_under_the_activated_mode() {
        let ctx = SetupContext::new(Arc::new(TinyCodec));
        let crane = HubType::builder("crane", HubKind::CPlus)
            .attach(
                PeripheralSpec::builder(PeripheralKind::CPlusXlMotor)
                    .name("winch")
                    .port(0)
                    .capability("sense_speed")
                    .capability("sense_pos")
                    .build()
                    .unwrap(),
            )
            .on_change("winch", |_, _| async {})
            .build();
        let hub = ctx.hub(&crane).build().unwrap();

        let transport = ScriptedTransport::with_hubs(&[]);
        let (queue, drain) = OutboundQueue::channel(ctx.bus());
        let close = CancellationToken::new();
        let drained = drain.spawn(Arc::clone(&transport), close.clone());
        hub.set_link(queue.link(hub.name(), "AA".to_owned()));

        let log = Arc::new(Mutex::new(Vec::new()));
        let winch = hub.peripheral("winch").unwrap();
        winch.connect("change::sense_speed", record(&log, "speed")).unwrap();
        winch.connect("change::sense_pos", record(&log, "pos")).unwrap();

        hub.inject(&[3, 0, 0]).await;
        hub.inject(&[4, 0, 1, 12]).await;
        close.cancel();
        drained.await.unwrap();

        // port 0, mode 1 (speed), delta 1, notifications on
        assert_eq!(transport.written(), vec![vec![8, 0, 1, 1, 0, 0, 0, 1]]);
        assert_eq!(*log.lock().unwrap(), vec!["speed"]);
        assert_eq!(winch.value("sense_speed"), Some(SensorValue::Int(12)));
        assert_eq!(winch.value("sense_pos"), None);
    }
}
