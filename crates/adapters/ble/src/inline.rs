//! Inline backend: every radio call is awaited on the caller's task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;
use uuid::Uuid;

use brickhub_app::ports::{NotificationCallback, TransportAdapter};
use brickhub_domain::device::DiscoveredDevice;
use brickhub_domain::error::BrickError;

use crate::error::BleError;

/// A characteristic on a connected peripheral.
#[derive(Debug, Clone)]
pub struct BleHandle {
    pub peripheral: Peripheral,
    pub characteristic: Characteristic,
}

/// btleplug central awaited directly.
#[derive(Debug, Default)]
pub struct BtleplugTransport {
    adapter_index: usize,
    central: OnceLock<Adapter>,
    seen: Mutex<HashMap<String, Peripheral>>,
    connected: Mutex<Vec<Peripheral>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    write_with_response: bool,
    torn_down: AtomicBool,
}

impl BtleplugTransport {
    #[must_use]
    pub fn new(adapter_index: usize) -> Self {
        Self {
            adapter_index,
            ..Self::default()
        }
    }

    /// Ask the hub to acknowledge every write.
    #[must_use]
    pub fn with_response(mut self, enabled: bool) -> Self {
        self.write_with_response = enabled;
        self
    }

    fn write_type(&self) -> WriteType {
        if self.write_with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        }
    }

    fn central(&self) -> Result<&Adapter, BleError> {
        self.central.get().ok_or(BleError::NotPoweredOn)
    }

    async fn acquire(&self) -> Result<(), BleError> {
        if self.central.get().is_some() {
            return Ok(());
        }
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .nth(self.adapter_index)
            .ok_or(BleError::NotAvailable)?;
        if tracing::enabled!(tracing::Level::INFO) {
            let info = adapter.adapter_info().await.ok();
            tracing::info!(adapter = ?info, "BLE adapter acquired");
        }
        if self.central.set(adapter).is_err() {
            tracing::debug!("BLE adapter acquired concurrently");
        }
        Ok(())
    }

    async fn snapshot(&self, service: Uuid) -> Result<Vec<DiscoveredDevice>, BleError> {
        let peripherals = self.central()?.peripherals().await?;
        let mut devices = Vec::with_capacity(peripherals.len());
        let mut seen = HashMap::with_capacity(peripherals.len());

        for peripheral in peripherals {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            let address = props.address.to_string();
            tracing::trace!(%address, name = ?props.local_name, "BLE device seen");
            if props.services.contains(&service) {
                devices.push(DiscoveredDevice::new(
                    props.local_name,
                    address.clone(),
                    props.services,
                ));
            }
            seen.insert(address, peripheral);
        }

        *self.seen.lock().unwrap_or_else(PoisonError::into_inner) = seen;
        Ok(devices)
    }

    async fn open(&self, device: &DiscoveredDevice) -> Result<Peripheral, BleError> {
        let peripheral = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device.address)
            .cloned()
            .ok_or_else(|| BleError::UnknownDevice(device.address.clone()))?;

        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(peripheral.clone());
        Ok(peripheral)
    }

    async fn listen(
        &self,
        handle: &BleHandle,
        callback: NotificationCallback,
    ) -> Result<(), BleError> {
        let mut notifications = handle.peripheral.notifications().await?;
        handle.peripheral.subscribe(&handle.characteristic).await?;

        let uuid = handle.characteristic.uuid;
        let listener = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == uuid {
                    callback(notification.value);
                }
            }
            tracing::debug!(%uuid, "notification stream ended");
        });
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
        Ok(())
    }

    async fn close(&self, peripheral: &Peripheral) -> Result<(), BleError> {
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|known| known.id() != peripheral.id());
        if peripheral.is_connected().await? {
            peripheral.disconnect().await?;
        }
        Ok(())
    }
}

/// Find a characteristic by UUID on a peripheral that has already
/// discovered its services.
fn find_characteristic(
    peripheral: &Peripheral,
    service: Uuid,
    uuid: Uuid,
) -> Result<Characteristic, BleError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid && c.service_uuid == service)
        .ok_or(BleError::CharacteristicNotFound { uuid })
}

impl TransportAdapter for BtleplugTransport {
    type Device = Peripheral;
    type Handle = BleHandle;

    async fn power_on(&self) -> Result<(), BrickError> {
        Ok(self.acquire().await?)
    }

    async fn scan_start(&self) -> Result<(), BrickError> {
        tracing::debug!("starting BLE scan");
        self.central()?
            .start_scan(ScanFilter::default())
            .await
            .map_err(BleError::from)?;
        Ok(())
    }

    async fn scan_stop(&self) -> Result<(), BrickError> {
        tracing::debug!("stopping BLE scan");
        self.central()?.stop_scan().await.map_err(BleError::from)?;
        Ok(())
    }

    async fn discover(&self, service: Uuid) -> Result<Vec<DiscoveredDevice>, BrickError> {
        Ok(self.snapshot(service).await?)
    }

    async fn connect(&self, device: &DiscoveredDevice) -> Result<Peripheral, BrickError> {
        tracing::info!(address = %device.address, name = ?device.name, "connecting");
        Ok(self.open(device).await?)
    }

    async fn disconnect(&self, device: &Peripheral) -> Result<(), BrickError> {
        if self.torn_down.load(Ordering::Acquire) {
            return Ok(());
        }
        Ok(self.close(device).await?)
    }

    async fn find_characteristic(
        &self,
        device: &Peripheral,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<BleHandle, BrickError> {
        let characteristic = find_characteristic(device, service, characteristic)?;
        Ok(BleHandle {
            peripheral: device.clone(),
            characteristic,
        })
    }

    async fn write(&self, handle: &BleHandle, bytes: &[u8]) -> Result<(), BrickError> {
        handle
            .peripheral
            .write(&handle.characteristic, bytes, self.write_type())
            .await
            .map_err(BleError::from)?;
        Ok(())
    }

    async fn subscribe_notify(
        &self,
        handle: &BleHandle,
        callback: NotificationCallback,
    ) -> Result<(), BrickError> {
        Ok(self.listen(handle, callback).await?)
    }

    async fn teardown(&self) -> Result<(), BrickError> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        for listener in self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            listener.abort();
        }

        let connected: Vec<Peripheral> = self
            .connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for peripheral in connected {
            if let Err(err) = peripheral.disconnect().await {
                tracing::warn!(%err, "failed to disconnect BLE peripheral");
            }
        }
        tracing::info!("BLE transport torn down");
        Ok(())
    }
}
