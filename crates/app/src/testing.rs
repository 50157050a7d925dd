//! In-memory transport and codec shared by the connection and lifecycle
//! tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use brickhub_domain::device::DiscoveredDevice;
use brickhub_domain::error::{BrickError, DecodeError};
use brickhub_domain::event::{CommandKind, DecodedEvent, EventKind, SensorValue};
use brickhub_domain::hub::LWP3_SERVICE_UUID;
use brickhub_domain::port::Port;

use crate::ports::{MessageCodec, NotificationCallback, TransportAdapter};

/// Frames are `[len, port, 0]` for an attach, `[len, port, 1, v]` for a
/// value and `[len, port, 2]` for a status. Encoding is `[port, params..]`.
pub struct TinyCodec;

impl MessageCodec for TinyCodec {
    fn encode(&self, _kind: CommandKind, port: Port, parameters: &[u8]) -> Vec<u8> {
        let mut out = vec![port.number()];
        out.extend_from_slice(parameters);
        out
    }

    fn decode(&self, bytes: &[u8]) -> Result<DecodedEvent, DecodeError> {
        match bytes {
            [_, port, 0] => Ok(DecodedEvent::attached(Port::new(*port), 0)),
            [_, port, 1, v] => Ok(DecodedEvent::value(
                Port::new(*port),
                SensorValue::Int(i64::from(*v)),
            )),
            [_, port, 2] => Ok(DecodedEvent {
                port: Port::new(*port),
                kind: EventKind::Status,
                value: SensorValue::None,
            }),
            _ => Err(DecodeError::Truncated(0)),
        }
    }

    fn attach_frame(&self, port: Port, _device_type: u16) -> Vec<u8> {
        vec![3, port.number(), 0]
    }
}

/// Transport backed by a fixed list of advertisers.
#[derive(Default)]
pub struct ScriptedTransport {
    pub devices: Mutex<Vec<DiscoveredDevice>>,
    pub discovers: AtomicUsize,
    pub scan_stops: AtomicUsize,
    pub disconnects: Mutex<Vec<String>>,
    pub writes: Mutex<Vec<(String, Vec<u8>)>>,
    pub callbacks: Mutex<Vec<(String, NotificationCallback)>>,
    pub teardowns: AtomicUsize,
    pub write_delay: Duration,
}

impl ScriptedTransport {
    pub fn with_hubs(hubs: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self::advertising(hubs))
    }

    /// Like [`Self::with_hubs`], but every write takes `delay`.
    pub fn with_slow_writes(hubs: &[(&str, &str)], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            write_delay: delay,
            ..Self::advertising(hubs)
        })
    }

    fn advertising(hubs: &[(&str, &str)]) -> Self {
        let transport = Self::default();
        *transport.devices.lock().unwrap() = hubs
            .iter()
            .map(|(name, address)| {
                DiscoveredDevice::new(Some((*name).to_owned()), *address, vec![LWP3_SERVICE_UUID])
            })
            .collect();
        transport
    }

    /// Payloads written so far, length prefix included.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    pub fn discover_count(&self) -> usize {
        self.discovers.load(Ordering::SeqCst)
    }

    /// Push raw bytes to whoever subscribed on `address`.
    pub fn notify(&self, address: &str, bytes: Vec<u8>) {
        for (subscribed, callback) in self.callbacks.lock().unwrap().iter() {
            if subscribed == address {
                callback(bytes.clone());
            }
        }
    }
}

impl TransportAdapter for ScriptedTransport {
    type Device = String;
    type Handle = String;

    async fn power_on(&self) -> Result<(), BrickError> {
        Ok(())
    }

    async fn scan_start(&self) -> Result<(), BrickError> {
        Ok(())
    }

    async fn scan_stop(&self) -> Result<(), BrickError> {
        self.scan_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn discover(&self, _service: Uuid) -> Result<Vec<DiscoveredDevice>, BrickError> {
        self.discovers.fetch_add(1, Ordering::SeqCst);
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn connect(&self, device: &DiscoveredDevice) -> Result<String, BrickError> {
        Ok(device.address.clone())
    }

    async fn disconnect(&self, device: &String) -> Result<(), BrickError> {
        self.disconnects.lock().unwrap().push(device.clone());
        Ok(())
    }

    async fn find_characteristic(
        &self,
        device: &String,
        _service: Uuid,
        _characteristic: Uuid,
    ) -> Result<String, BrickError> {
        Ok(device.clone())
    }

    async fn write(&self, handle: &String, bytes: &[u8]) -> Result<(), BrickError> {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        self.writes
            .lock()
            .unwrap()
            .push((handle.clone(), bytes.to_vec()));
        Ok(())
    }

    async fn subscribe_notify(
        &self,
        handle: &String,
        callback: NotificationCallback,
    ) -> Result<(), BrickError> {
        self.callbacks
            .lock()
            .unwrap()
            .push((handle.clone(), callback));
        Ok(())
    }

    async fn teardown(&self) -> Result<(), BrickError> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
