//! Device: one BLE advertiser seen during a scan.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A device reported by a scan snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Backend-specific address (MAC on Linux/Windows, UUID on macOS).
    pub address: String,
    /// Service UUIDs present in the advertisement.
    pub services: Vec<Uuid>,
}

impl DiscoveredDevice {
    #[must_use]
    pub fn new(name: Option<String>, address: impl Into<String>, services: Vec<Uuid>) -> Self {
        Self {
            name,
            address: address.into(),
            services,
        }
    }

    #[must_use]
    pub fn advertises(&self, service: Uuid) -> bool {
        self.services.contains(&service)
    }

    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }
}
