//! Transport port: the uniform surface over the BLE backends.
//!
//! Two backends implement this trait (one awaiting the radio stack inline,
//! one round-tripping every call through a driver task). Nothing outside the
//! adapter crate may depend on which one is in use.

use std::future::Future;
use std::sync::Arc;

use brickhub_domain::device::DiscoveredDevice;
use brickhub_domain::error::BrickError;
use uuid::Uuid;

/// Callback invoked with the raw bytes of every notification.
///
/// Backends call it from their own receive path, so it must return quickly.
pub type NotificationCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// A BLE central able to find, connect, write to and listen to hubs.
pub trait TransportAdapter: Send + Sync {
    /// A connected device.
    type Device: Clone + Send + Sync + 'static;
    /// A resolved characteristic, usable for writes and notifications.
    type Handle: Clone + Send + Sync + 'static;

    /// Acquire and power up the radio.
    fn power_on(&self) -> impl Future<Output = Result<(), BrickError>> + Send;

    fn scan_start(&self) -> impl Future<Output = Result<(), BrickError>> + Send;

    fn scan_stop(&self) -> impl Future<Output = Result<(), BrickError>> + Send;

    /// Current scan snapshot of devices advertising `service`.
    ///
    /// Each call returns the whole snapshot, not a diff against the
    /// previous call.
    fn discover(
        &self,
        service: Uuid,
    ) -> impl Future<Output = Result<Vec<DiscoveredDevice>, BrickError>> + Send;

    fn connect(
        &self,
        device: &DiscoveredDevice,
    ) -> impl Future<Output = Result<Self::Device, BrickError>> + Send;

    /// Disconnect a device. Disconnecting an already closed device is not
    /// an error.
    fn disconnect(&self, device: &Self::Device)
    -> impl Future<Output = Result<(), BrickError>> + Send;

    fn find_characteristic(
        &self,
        device: &Self::Device,
        service: Uuid,
        characteristic: Uuid,
    ) -> impl Future<Output = Result<Self::Handle, BrickError>> + Send;

    fn write(
        &self,
        handle: &Self::Handle,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), BrickError>> + Send;

    fn subscribe_notify(
        &self,
        handle: &Self::Handle,
        callback: NotificationCallback,
    ) -> impl Future<Output = Result<(), BrickError>> + Send;

    /// Release the radio. Idempotent, and safe to call when nothing was
    /// ever connected.
    fn teardown(&self) -> impl Future<Output = Result<(), BrickError>> + Send;
}

impl<T: TransportAdapter> TransportAdapter for Arc<T> {
    type Device = T::Device;
    type Handle = T::Handle;

    fn power_on(&self) -> impl Future<Output = Result<(), BrickError>> + Send {
        (**self).power_on()
    }

    fn scan_start(&self) -> impl Future<Output = Result<(), BrickError>> + Send {
        (**self).scan_start()
    }

    fn scan_stop(&self) -> impl Future<Output = Result<(), BrickError>> + Send {
        (**self).scan_stop()
    }

    fn discover(
        &self,
        service: Uuid,
    ) -> impl Future<Output = Result<Vec<DiscoveredDevice>, BrickError>> + Send {
        (**self).discover(service)
    }

    fn connect(
        &self,
        device: &DiscoveredDevice,
    ) -> impl Future<Output = Result<Self::Device, BrickError>> + Send {
        (**self).connect(device)
    }

    fn disconnect(
        &self,
        device: &Self::Device,
    ) -> impl Future<Output = Result<(), BrickError>> + Send {
        (**self).disconnect(device)
    }

    fn find_characteristic(
        &self,
        device: &Self::Device,
        service: Uuid,
        characteristic: Uuid,
    ) -> impl Future<Output = Result<Self::Handle, BrickError>> + Send {
        (**self).find_characteristic(device, service, characteristic)
    }

    fn write(
        &self,
        handle: &Self::Handle,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), BrickError>> + Send {
        (**self).write(handle, bytes)
    }

    fn subscribe_notify(
        &self,
        handle: &Self::Handle,
        callback: NotificationCallback,
    ) -> impl Future<Output = Result<(), BrickError>> + Send {
        (**self).subscribe_notify(handle, callback)
    }

    fn teardown(&self) -> impl Future<Output = Result<(), BrickError>> + Send {
        (**self).teardown()
    }
}
