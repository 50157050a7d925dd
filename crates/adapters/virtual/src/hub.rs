//! Simulated hub: one advertiser the virtual transport can find.

use brickhub_app::ports::NotificationCallback;
use brickhub_domain::device::DiscoveredDevice;
use brickhub_domain::hub::HubKind;

/// A hub that exists only in memory.
#[derive(Clone)]
pub struct SimulatedHub {
    pub(crate) name: String,
    pub(crate) address: String,
    pub(crate) kind: HubKind,
    pub(crate) appears_after: usize,
    pub(crate) connected: bool,
    pub(crate) writes: Vec<Vec<u8>>,
    pub(crate) callback: Option<NotificationCallback>,
}

impl SimulatedHub {
    /// A hub advertising the default name of `kind` at `address`.
    #[must_use]
    pub fn new(kind: HubKind, address: impl Into<String>) -> Self {
        Self {
            name: kind.default_ble_name().to_owned(),
            address: address.into(),
            kind,
            appears_after: 0,
            connected: false,
            writes: Vec::new(),
            callback: None,
        }
    }

    /// Advertise `name` instead of the default.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Stay invisible for the first `scans` discovery snapshots.
    #[must_use]
    pub fn appears_after(mut self, scans: usize) -> Self {
        self.appears_after = scans;
        self
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn kind(&self) -> HubKind {
        self.kind
    }

    pub(crate) fn advertisement(&self) -> DiscoveredDevice {
        DiscoveredDevice::new(
            Some(self.name.clone()),
            self.address.clone(),
            vec![self.kind.uart_uuid()],
        )
    }
}

impl std::fmt::Debug for SimulatedHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedHub")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("connected", &self.connected)
            .field("writes", &self.writes.len())
            .finish_non_exhaustive()
    }
}
