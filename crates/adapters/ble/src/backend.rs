//! Backend selection: one transport type whatever the configured backend.

use btleplug::platform::Peripheral;
use uuid::Uuid;

use brickhub_app::ports::{NotificationCallback, TransportAdapter};
use brickhub_domain::device::DiscoveredDevice;
use brickhub_domain::error::BrickError;

use crate::config::{BackendKind, BleConfig};
use crate::inline::{BleHandle, BtleplugTransport};
use crate::queued::QueuedTransport;

/// The configured BLE backend.
#[derive(Debug)]
pub enum BleBackend {
    Inline(BtleplugTransport),
    Queued(QueuedTransport<BtleplugTransport>),
}

impl BleBackend {
    /// Build the backend named in `config`. The queued backend starts its
    /// driver task right away, so this must run inside a tokio runtime.
    #[must_use]
    pub fn from_config(config: &BleConfig) -> Self {
        let radio =
            BtleplugTransport::new(config.adapter_index).with_response(config.write_with_response);
        match config.backend {
            BackendKind::Inline => Self::Inline(radio),
            BackendKind::Queued => Self::Queued(QueuedTransport::spawn(radio)),
        }
    }
}

impl TransportAdapter for BleBackend {
    type Device = Peripheral;
    type Handle = BleHandle;

    async fn power_on(&self) -> Result<(), BrickError> {
        match self {
            Self::Inline(inner) => inner.power_on().await,
            Self::Queued(inner) => inner.power_on().await,
        }
    }

    async fn scan_start(&self) -> Result<(), BrickError> {
        match self {
            Self::Inline(inner) => inner.scan_start().await,
            Self::Queued(inner) => inner.scan_start().await,
        }
    }

    async fn scan_stop(&self) -> Result<(), BrickError> {
        match self {
            Self::Inline(inner) => inner.scan_stop().await,
            Self::Queued(inner) => inner.scan_stop().await,
        }
    }

    async fn discover(&self, service: Uuid) -> Result<Vec<DiscoveredDevice>, BrickError> {
        match self {
            Self::Inline(inner) => inner.discover(service).await,
            Self::Queued(inner) => inner.discover(service).await,
        }
    }

    async fn connect(&self, device: &DiscoveredDevice) -> Result<Peripheral, BrickError> {
        match self {
            Self::Inline(inner) => inner.connect(device).await,
            Self::Queued(inner) => inner.connect(device).await,
        }
    }

    async fn disconnect(&self, device: &Peripheral) -> Result<(), BrickError> {
        match self {
            Self::Inline(inner) => inner.disconnect(device).await,
            Self::Queued(inner) => inner.disconnect(device).await,
        }
    }

    async fn find_characteristic(
        &self,
        device: &Peripheral,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<BleHandle, BrickError> {
        match self {
            Self::Inline(inner) => {
                inner
                    .find_characteristic(device, service, characteristic)
                    .await
            }
            Self::Queued(inner) => {
                inner
                    .find_characteristic(device, service, characteristic)
                    .await
            }
        }
    }

    async fn write(&self, handle: &BleHandle, bytes: &[u8]) -> Result<(), BrickError> {
        match self {
            Self::Inline(inner) => inner.write(handle, bytes).await,
            Self::Queued(inner) => inner.write(handle, bytes).await,
        }
    }

    async fn subscribe_notify(
        &self,
        handle: &BleHandle,
        callback: NotificationCallback,
    ) -> Result<(), BrickError> {
        match self {
            Self::Inline(inner) => inner.subscribe_notify(handle, callback).await,
            Self::Queued(inner) => inner.subscribe_notify(handle, callback).await,
        }
    }

    async fn teardown(&self) -> Result<(), BrickError> {
        match self {
            Self::Inline(inner) => inner.teardown().await,
            Self::Queued(inner) => inner.teardown().await,
        }
    }
}
