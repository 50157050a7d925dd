//! Connection manager: finds the device behind a hub and wires it up.
//!
//! Discovery polls the transport's scan snapshot until a device matches or
//! the try budget runs out. Scanning is always stopped again, whatever the
//! outcome. Once connected the hub gets its outbound link and its router,
//! and intrinsic peripherals are announced with synthetic attach frames.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use brickhub_domain::device::DiscoveredDevice;
use brickhub_domain::error::{BrickError, NotFoundError};
use brickhub_domain::hub::HubState;

use crate::hub::Hub;
use crate::ports::TransportAdapter;
use crate::queue::OutboundQueue;
use crate::registry::HubRegistry;
use crate::router::NotificationRouter;

/// Default number of discovery attempts per hub.
pub const DEFAULT_TRIES: u32 = 60;
/// Default pause between two discovery attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// How hard to look for a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectConfig {
    pub tries: u32,
    pub backoff: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            tries: DEFAULT_TRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// A connected hub as seen by the transport.
#[derive(Debug, Clone)]
pub struct Connection<D, H> {
    pub device: D,
    pub handle: H,
    pub address: String,
}

/// Keep only the devices advertising `service`.
#[must_use]
pub fn filter_by_service(devices: Vec<DiscoveredDevice>, service: Uuid) -> Vec<DiscoveredDevice> {
    devices
        .into_iter()
        .filter(|device| device.advertises(service))
        .collect()
}

/// First device called `name`. When `address` is given, only a device with
/// that address counts as a match.
#[must_use]
pub fn match_device<'a>(
    devices: &'a [DiscoveredDevice],
    name: &str,
    address: Option<&str>,
) -> Option<&'a DiscoveredDevice> {
    devices.iter().find(|device| {
        device.has_name(name) && address.is_none_or(|address| device.address == address)
    })
}

/// Discovers and connects hubs over one transport.
#[derive(Debug)]
pub struct ConnectionManager<T> {
    transport: T,
    config: ConnectConfig,
}

impl<T: TransportAdapter> ConnectionManager<T> {
    pub fn new(transport: T, config: ConnectConfig) -> Self {
        Self { transport, config }
    }

    /// Scan until a device matching `hub` shows up.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] once every try is used up,
    /// [`BrickError::Cancelled`] when `cancel` fires, or the transport's own
    /// error.
    pub async fn find(
        &self,
        hub: &Hub,
        cancel: &CancellationToken,
    ) -> Result<DiscoveredDevice, BrickError> {
        self.transport.scan_start().await?;
        let found = self.poll(hub, cancel).await;
        if let Err(err) = self.transport.scan_stop().await {
            tracing::warn!(hub = %hub, error = %err, "unable to stop scanning");
        }
        found
    }

    async fn poll(
        &self,
        hub: &Hub,
        cancel: &CancellationToken,
    ) -> Result<DiscoveredDevice, BrickError> {
        let service = hub.uart_uuid();
        let mut remaining = self.config.tries;

        while remaining > 0 {
            if cancel.is_cancelled() {
                return Err(BrickError::Cancelled);
            }

            let devices = filter_by_service(self.transport.discover(service).await?, service);
            if let Some(device) = match_device(&devices, hub.ble_name(), hub.declared_address()) {
                tracing::info!(hub = %hub, address = %device.address, "found hub");
                return Ok(device.clone());
            }

            remaining -= 1;
            tracing::debug!(
                hub = %hub,
                ble_name = hub.ble_name(),
                seen = devices.len(),
                remaining,
                "hub not found yet"
            );
            if remaining > 0 {
                tokio::select! {
                    () = cancel.cancelled() => return Err(BrickError::Cancelled),
                    () = tokio::time::sleep(self.config.backoff) => {}
                }
            }
        }

        Err(NotFoundError {
            entity: "Device",
            id: format!("{} ({} tries)", hub.ble_name(), self.config.tries),
        }
        .into())
    }

    /// Find, connect and wire up `hub`.
    ///
    /// On success the hub is `Connected`, has an outbound link on `queue`,
    /// a notification router, and its intrinsic peripherals have been
    /// announced.
    ///
    /// # Errors
    ///
    /// See [`find`](Self::find); transport errors while connecting are
    /// returned after disconnecting the half-open device.
    pub async fn connect(
        &self,
        hub: &Arc<Hub>,
        queue: &OutboundQueue<T::Handle>,
        registry: &HubRegistry,
        cancel: &CancellationToken,
    ) -> Result<Connection<T::Device, T::Handle>, BrickError> {
        hub.transition(HubState::Scanning)?;
        let found = self.find(hub, cancel).await?;

        let device = self.transport.connect(&found).await?;
        match self.wire(hub, &device, &found, queue, registry, cancel).await {
            Ok(handle) => Ok(Connection {
                device,
                handle,
                address: found.address,
            }),
            Err(err) => {
                if let Err(disconnect) = self.transport.disconnect(&device).await {
                    tracing::warn!(
                        hub = %hub,
                        error = %disconnect,
                        "unable to disconnect half-open device"
                    );
                }
                Err(err)
            }
        }
    }

    async fn wire(
        &self,
        hub: &Arc<Hub>,
        device: &T::Device,
        found: &DiscoveredDevice,
        queue: &OutboundQueue<T::Handle>,
        registry: &HubRegistry,
        cancel: &CancellationToken,
    ) -> Result<T::Handle, BrickError> {
        let handle = self
            .transport
            .find_characteristic(device, hub.uart_uuid(), hub.char_uuid())
            .await?;

        hub.set_address(found.address.clone());
        registry.mark_reachable(&found.address, hub);
        hub.set_link(queue.link(hub.name(), handle.clone()));
        hub.transition(HubState::Connected)?;

        let callback = NotificationRouter::spawn(hub, cancel.child_token());
        self.transport
            .subscribe_notify(&handle, Arc::clone(&callback))
            .await?;

        for peripheral in hub.intrinsic_peripherals() {
            let frame = hub
                .codec()
                .attach_frame(peripheral.port(), peripheral.kind().device_type());
            tracing::debug!(
                hub = %hub,
                peripheral = %peripheral,
                "announcing intrinsic peripheral"
            );
            callback(frame);
        }

        tracing::info!(hub = %hub, address = %found.address, "hub connected");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use brickhub_domain::hub::HubKind;
    use brickhub_domain::peripheral::{PeripheralKind, PeripheralSpec};

    use super::*;
    use crate::hub::{HubType, SetupContext};
    use crate::testing::{ScriptedTransport, TinyCodec};

    fn device(name: &str, address: &str) -> DiscoveredDevice {
        DiscoveredDevice::new(Some(name.to_owned()), address, Vec::new())
    }

    #[test]
    fn should_match_first_device_by_name() {
        let devices = vec![
            device("HUB NO.4", "AA"),
            device("Control+ Hub", "BB"),
            device("Control+ Hub", "CC"),
        ];
        let found = match_device(&devices, "Control+ Hub", None).unwrap();
        assert_eq!(found.address, "BB");
    }

    #[test]
    fn should_require_address_when_declared() {
        let devices = vec![device("Control+ Hub", "BB"), device("Control+ Hub", "CC")];
        let found = match_device(&devices, "Control+ Hub", Some("CC")).unwrap();
        assert_eq!(found.address, "CC");
        assert!(match_device(&devices, "Control+ Hub", Some("DD")).is_none());
    }

    #[test]
    fn should_never_match_on_address_alone() {
        let devices = vec![device("HUB NO.4", "BB")];
        assert!(match_device(&devices, "Control+ Hub", Some("BB")).is_none());
    }

    #[test]
    fn should_ignore_unnamed_devices() {
        let devices = vec![DiscoveredDevice::new(None, "BB", Vec::new())];
        assert!(match_device(&devices, "Control+ Hub", None).is_none());
    }

    #[test]
    fn should_filter_devices_by_advertised_service() {
        let service = Uuid::from_u128(1);
        let devices = vec![
            DiscoveredDevice::new(Some("a".to_owned()), "AA", vec![service]),
            DiscoveredDevice::new(Some("b".to_owned()), "BB", vec![Uuid::from_u128(2)]),
        ];
        let kept = filter_by_service(devices, service);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].address, "AA");
    }

    fn truck(calls: &Arc<AtomicUsize>) -> Arc<HubType> {
        let calls = Arc::clone(calls);
        HubType::builder("truck", HubKind::CPlus)
            .attach(
                PeripheralSpec::builder(PeripheralKind::Button)
                    .name("hub_btn")
                    .capability("sense_press")
                    .build()
                    .unwrap(),
            )
            .on_change("hub_btn", move |_, _| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn should_give_up_after_the_configured_tries() {
        let transport = ScriptedTransport::with_hubs(&[("HUB NO.4", "AA")]);
        let ctx = SetupContext::new(Arc::new(TinyCodec));
        let hub = ctx
            .hub(&truck(&Arc::new(AtomicUsize::new(0))))
            .build()
            .unwrap();
        let manager = ConnectionManager::new(
            Arc::clone(&transport),
            ConnectConfig {
                tries: 3,
                backoff: Duration::from_secs(1),
            },
        );

        let err = manager
            .find(&hub, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BrickError::NotFound(_)));
        assert_eq!(transport.discover_count(), 3);
        assert_eq!(transport.scan_stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_retrying_when_cancelled() {
        let transport = ScriptedTransport::with_hubs(&[]);
        let ctx = SetupContext::new(Arc::new(TinyCodec));
        let hub = ctx
            .hub(&truck(&Arc::new(AtomicUsize::new(0))))
            .build()
            .unwrap();
        let manager = ConnectionManager::new(Arc::clone(&transport), ConnectConfig::default());
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel();
        });
        let err = manager.find(&hub, &cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(transport.discover_count(), 3);
        assert_eq!(transport.scan_stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_wire_hub_and_announce_intrinsic_button() {
        let transport = ScriptedTransport::with_hubs(&[("Control+ Hub", "CC")]);
        let ctx = SetupContext::new(Arc::new(TinyCodec));
        let calls = Arc::new(AtomicUsize::new(0));
        let hub = ctx.hub(&truck(&calls)).build().unwrap();
        let manager = ConnectionManager::new(Arc::clone(&transport), ConnectConfig::default());
        let (queue, _drain) = OutboundQueue::channel(ctx.bus());
        let cancel = CancellationToken::new();

        let connection = manager
            .connect(&hub, &queue, ctx.registry(), &cancel)
            .await
            .unwrap();

        assert_eq!(connection.address, "CC");
        assert_eq!(hub.state(), HubState::Connected);
        assert_eq!(hub.address(), Some("CC"));
        assert!(hub.is_linked());
        assert!(ctx.registry().by_address("CC").is_some());

        for _ in 0..50 {
            if calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(hub.peripheral("hub_btn").unwrap().is_attached());
        cancel.cancel();
    }
}
