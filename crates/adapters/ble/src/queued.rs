//! Queued backend: one driver task owns the radio and serves every call
//! from a request channel, replying over a oneshot.
//!
//! Closing the transport sends a quit request. The driver tears the inner
//! transport down, answers, and stops; calls made after that fail with
//! [`BleError::DriverGone`].

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use brickhub_app::ports::{NotificationCallback, TransportAdapter};
use brickhub_domain::device::DiscoveredDevice;
use brickhub_domain::error::BrickError;

use crate::error::BleError;

type Reply<T> = oneshot::Sender<Result<T, BrickError>>;

enum Request<D, H> {
    PowerOn(Reply<()>),
    ScanStart(Reply<()>),
    ScanStop(Reply<()>),
    Discover(Uuid, Reply<Vec<DiscoveredDevice>>),
    Connect(DiscoveredDevice, Reply<D>),
    Disconnect(D, Reply<()>),
    FindCharacteristic {
        device: D,
        service: Uuid,
        characteristic: Uuid,
        reply: Reply<H>,
    },
    Write(H, Vec<u8>, Reply<()>),
    Subscribe(H, NotificationCallback, Reply<()>),
    Quit(Reply<()>),
}

/// Runs `T` on a dedicated driver task.
#[derive(Debug)]
pub struct QueuedTransport<T: TransportAdapter> {
    sender: mpsc::UnboundedSender<Request<T::Device, T::Handle>>,
    torn_down: AtomicBool,
}

impl<T> QueuedTransport<T>
where
    T: TransportAdapter + 'static,
{
    /// Move `inner` onto a new driver task.
    #[must_use]
    pub fn spawn(inner: T) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(drive(inner, receiver));
        Self {
            sender,
            torn_down: AtomicBool::new(false),
        }
    }

    async fn call<R>(
        &self,
        request: impl FnOnce(Reply<R>) -> Request<T::Device, T::Handle>,
    ) -> Result<R, BrickError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(request(reply))
            .map_err(|_| BleError::DriverGone)?;
        response.await.map_err(|_| BleError::DriverGone)?
    }
}

impl<D, H> std::fmt::Debug for Request<D, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::PowerOn(_) => "PowerOn",
            Self::ScanStart(_) => "ScanStart",
            Self::ScanStop(_) => "ScanStop",
            Self::Discover(..) => "Discover",
            Self::Connect(..) => "Connect",
            Self::Disconnect(..) => "Disconnect",
            Self::FindCharacteristic { .. } => "FindCharacteristic",
            Self::Write(..) => "Write",
            Self::Subscribe(..) => "Subscribe",
            Self::Quit(_) => "Quit",
        })
    }
}

fn answer<T>(reply: Reply<T>, result: Result<T, BrickError>) {
    if reply.send(result).is_err() {
        tracing::debug!("BLE caller went away before the reply");
    }
}

async fn drive<T: TransportAdapter>(
    inner: T,
    mut requests: mpsc::UnboundedReceiver<Request<T::Device, T::Handle>>,
) {
    tracing::debug!("BLE driver started");
    while let Some(request) = requests.recv().await {
        tracing::trace!(?request, "BLE request");
        match request {
            Request::PowerOn(reply) => answer(reply, inner.power_on().await),
            Request::ScanStart(reply) => answer(reply, inner.scan_start().await),
            Request::ScanStop(reply) => answer(reply, inner.scan_stop().await),
            Request::Discover(service, reply) => answer(reply, inner.discover(service).await),
            Request::Connect(device, reply) => answer(reply, inner.connect(&device).await),
            Request::Disconnect(device, reply) => answer(reply, inner.disconnect(&device).await),
            Request::FindCharacteristic {
                device,
                service,
                characteristic,
                reply,
            } => answer(
                reply,
                inner
                    .find_characteristic(&device, service, characteristic)
                    .await,
            ),
            Request::Write(handle, bytes, reply) => {
                answer(reply, inner.write(&handle, &bytes).await);
            }
            Request::Subscribe(handle, callback, reply) => {
                answer(reply, inner.subscribe_notify(&handle, callback).await);
            }
            Request::Quit(reply) => {
                answer(reply, inner.teardown().await);
                break;
            }
        }
    }
    tracing::debug!("BLE driver stopped");
}

impl<T> TransportAdapter for QueuedTransport<T>
where
    T: TransportAdapter + 'static,
{
    type Device = T::Device;
    type Handle = T::Handle;

    async fn power_on(&self) -> Result<(), BrickError> {
        self.call(Request::PowerOn).await
    }

    async fn scan_start(&self) -> Result<(), BrickError> {
        self.call(Request::ScanStart).await
    }

    async fn scan_stop(&self) -> Result<(), BrickError> {
        self.call(Request::ScanStop).await
    }

    async fn discover(&self, service: Uuid) -> Result<Vec<DiscoveredDevice>, BrickError> {
        self.call(|reply| Request::Discover(service, reply)).await
    }

    async fn connect(&self, device: &DiscoveredDevice) -> Result<T::Device, BrickError> {
        let device = device.clone();
        self.call(|reply| Request::Connect(device, reply)).await
    }

    async fn disconnect(&self, device: &T::Device) -> Result<(), BrickError> {
        if self.torn_down.load(Ordering::Acquire) {
            return Ok(());
        }
        let device = device.clone();
        self.call(|reply| Request::Disconnect(device, reply)).await
    }

    async fn find_characteristic(
        &self,
        device: &T::Device,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<T::Handle, BrickError> {
        let device = device.clone();
        self.call(|reply| Request::FindCharacteristic {
            device,
            service,
            characteristic,
            reply,
        })
        .await
    }

    async fn write(&self, handle: &T::Handle, bytes: &[u8]) -> Result<(), BrickError> {
        let handle = handle.clone();
        let bytes = bytes.to_vec();
        self.call(|reply| Request::Write(handle, bytes, reply)).await
    }

    async fn subscribe_notify(
        &self,
        handle: &T::Handle,
        callback: NotificationCallback,
    ) -> Result<(), BrickError> {
        let handle = handle.clone();
        self.call(|reply| Request::Subscribe(handle, callback, reply))
            .await
    }

    async fn teardown(&self) -> Result<(), BrickError> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!("sending quit to BLE driver");
        self.call(Request::Quit).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use brickhub_adapter_virtual::{SimulatedHub, VirtualTransport};
    use brickhub_domain::hub::{HubKind, LWP3_CHARACTERISTIC_UUID, LWP3_SERVICE_UUID};

    use super::*;

    fn simulated() -> Arc<VirtualTransport> {
        Arc::new(VirtualTransport::new(vec![SimulatedHub::new(
            HubKind::PoweredUp,
            "90:84:2B:00:00:01",
        )]))
    }

    #[tokio::test]
    async fn should_round_trip_calls_through_the_driver() {
        let inner = simulated();
        let transport = QueuedTransport::spawn(Arc::clone(&inner));

        transport.power_on().await.unwrap();
        transport.scan_start().await.unwrap();
        let devices = transport.discover(LWP3_SERVICE_UUID).await.unwrap();
        assert_eq!(devices.len(), 1);

        let device = transport.connect(&devices[0]).await.unwrap();
        let handle = transport
            .find_characteristic(&device, LWP3_SERVICE_UUID, LWP3_CHARACTERISTIC_UUID)
            .await
            .unwrap();
        transport.write(&handle, &[3, 0x00, 0x01]).await.unwrap();

        assert_eq!(inner.writes("90:84:2B:00:00:01"), vec![vec![3, 0x00, 0x01]]);
    }

    #[tokio::test]
    async fn should_stop_driver_on_teardown_and_stay_idempotent() {
        let inner = simulated();
        let transport = QueuedTransport::spawn(Arc::clone(&inner));
        transport.power_on().await.unwrap();

        transport.teardown().await.unwrap();
        transport.teardown().await.unwrap();

        assert_eq!(inner.teardown_count(), 1);
        assert!(transport.scan_start().await.is_err());
    }

    #[tokio::test]
    async fn should_accept_disconnect_after_teardown() {
        let inner = simulated();
        let transport = QueuedTransport::spawn(Arc::clone(&inner));
        transport.power_on().await.unwrap();
        let devices = transport.discover(LWP3_SERVICE_UUID).await.unwrap();
        let device = transport.connect(&devices[0]).await.unwrap();

        transport.teardown().await.unwrap();

        assert!(transport.disconnect(&device).await.is_ok());
    }
}
