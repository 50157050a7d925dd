//! # brickhub-adapter-virtual
//!
//! Virtual transport that simulates LEGO hubs in memory, for testing and
//! demonstration without a Bluetooth radio.
//!
//! ## Behaviour
//!
//! | Call | Effect |
//! |------|--------|
//! | `discover` | every simulated hub past its `appears_after` count |
//! | `connect` / `disconnect` | flips the hub's connected flag, records disconnects |
//! | `write` | appends the bytes to the hub's write log |
//! | `subscribe_notify` | keeps the callback; [`VirtualTransport::notify`] feeds it |
//! | `teardown` | disconnects everything, once |
//!
//! A button press can be scheduled to fire some time after each hub
//! subscribes, which is how the daemon's demo mode exercises the full
//! inbound path.
//!
//! ## Dependency rule
//!
//! Depends on `brickhub-app` (port traits) and `brickhub-domain` only.

mod hub;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use uuid::Uuid;

use brickhub_app::ports::{NotificationCallback, TransportAdapter};
use brickhub_domain::device::DiscoveredDevice;
use brickhub_domain::error::{BrickError, NotFoundError};

pub use hub::SimulatedHub;

/// LWP3 hub property update: button state. The last byte is 1 when pressed.
const BUTTON_PRESSED: [u8; 6] = [0x06, 0x00, 0x01, 0x02, 0x06, 0x01];
const BUTTON_RELEASED: [u8; 6] = [0x06, 0x00, 0x01, 0x02, 0x06, 0x00];

/// In-memory [`TransportAdapter`].
#[derive(Debug, Default)]
pub struct VirtualTransport {
    hubs: Mutex<Vec<SimulatedHub>>,
    button_press_after: Option<Duration>,
    powered: AtomicBool,
    scanning: AtomicBool,
    discovers: AtomicUsize,
    disconnects: Mutex<Vec<String>>,
    teardowns: AtomicUsize,
    torn_down: AtomicBool,
}

/// Characteristic handle of a simulated hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHandle {
    pub address: String,
}

impl VirtualTransport {
    #[must_use]
    pub fn new(hubs: Vec<SimulatedHub>) -> Self {
        Self {
            hubs: Mutex::new(hubs),
            ..Self::default()
        }
    }

    /// Press and release the hub button of every hub `delay` after it
    /// subscribes to notifications.
    #[must_use]
    pub fn with_button_press_after(mut self, delay: Duration) -> Self {
        self.button_press_after = Some(delay);
        self
    }

    #[must_use]
    pub fn is_powered(&self) -> bool {
        self.powered.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn discover_count(&self) -> usize {
        self.discovers.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn teardown_count(&self) -> usize {
        self.teardowns.load(Ordering::Acquire)
    }

    /// Addresses passed to `disconnect`, in call order.
    #[must_use]
    pub fn disconnects(&self) -> Vec<String> {
        self.disconnects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Everything written to the hub at `address`.
    #[must_use]
    pub fn writes(&self, address: &str) -> Vec<Vec<u8>> {
        self.with_hub(address, |hub| hub.writes.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_connected(&self, address: &str) -> bool {
        self.with_hub(address, |hub| hub.connected)
            .unwrap_or(false)
    }

    /// Deliver `bytes` as a notification from the hub at `address`.
    /// Returns whether anybody was listening.
    pub fn notify(&self, address: &str, bytes: Vec<u8>) -> bool {
        let Some(Some(callback)) = self.with_hub(address, |hub| hub.callback.clone()) else {
            return false;
        };
        callback(bytes);
        true
    }

    /// Simulate a press and release of the hub button.
    pub fn press_button(&self, address: &str) -> bool {
        self.notify(address, BUTTON_PRESSED.to_vec())
            && self.notify(address, BUTTON_RELEASED.to_vec())
    }

    fn with_hub<R>(&self, address: &str, f: impl FnOnce(&mut SimulatedHub) -> R) -> Option<R> {
        self.hubs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_mut()
            .find(|hub| hub.address == address)
            .map(f)
    }

    fn require(&self, address: &str) -> Result<(), BrickError> {
        if self.with_hub(address, |_| ()).is_some() {
            return Ok(());
        }
        Err(NotFoundError {
            entity: "Device",
            id: address.to_owned(),
        }
        .into())
    }
}

impl TransportAdapter for VirtualTransport {
    type Device = String;
    type Handle = VirtualHandle;

    async fn power_on(&self) -> Result<(), BrickError> {
        self.powered.store(true, Ordering::Release);
        Ok(())
    }

    async fn scan_start(&self) -> Result<(), BrickError> {
        self.scanning.store(true, Ordering::Release);
        Ok(())
    }

    async fn scan_stop(&self) -> Result<(), BrickError> {
        self.scanning.store(false, Ordering::Release);
        Ok(())
    }

    async fn discover(&self, service: Uuid) -> Result<Vec<DiscoveredDevice>, BrickError> {
        let round = self.discovers.fetch_add(1, Ordering::AcqRel);
        let devices = self
            .hubs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|hub| hub.appears_after <= round)
            .map(SimulatedHub::advertisement)
            .filter(|device| device.advertises(service))
            .collect();
        Ok(devices)
    }

    async fn connect(&self, device: &DiscoveredDevice) -> Result<String, BrickError> {
        self.require(&device.address)?;
        self.with_hub(&device.address, |hub| hub.connected = true);
        tracing::debug!(address = %device.address, "virtual hub connected");
        Ok(device.address.clone())
    }

    async fn disconnect(&self, device: &String) -> Result<(), BrickError> {
        self.disconnects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device.clone());
        self.with_hub(device, |hub| {
            hub.connected = false;
            hub.callback = None;
        });
        Ok(())
    }

    async fn find_characteristic(
        &self,
        device: &String,
        _service: Uuid,
        _characteristic: Uuid,
    ) -> Result<VirtualHandle, BrickError> {
        self.require(device)?;
        Ok(VirtualHandle {
            address: device.clone(),
        })
    }

    async fn write(&self, handle: &VirtualHandle, bytes: &[u8]) -> Result<(), BrickError> {
        self.require(&handle.address)?;
        self.with_hub(&handle.address, |hub| hub.writes.push(bytes.to_vec()));
        Ok(())
    }

    async fn subscribe_notify(
        &self,
        handle: &VirtualHandle,
        callback: NotificationCallback,
    ) -> Result<(), BrickError> {
        self.require(&handle.address)?;
        self.with_hub(&handle.address, |hub| {
            hub.callback = Some(callback.clone());
        });

        if let Some(delay) = self.button_press_after {
            let address = handle.address.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                tracing::info!(%address, "simulating hub button press");
                callback(BUTTON_PRESSED.to_vec());
                callback(BUTTON_RELEASED.to_vec());
            });
        }
        Ok(())
    }

    async fn teardown(&self) -> Result<(), BrickError> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.teardowns.fetch_add(1, Ordering::AcqRel);
        for hub in self
            .hubs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_mut()
        {
            hub.connected = false;
            hub.callback = None;
        }
        tracing::debug!("virtual transport torn down");
        Ok(())
    }
}
