//! Hub: hub families and the per-hub lifecycle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// UART-like service exposed by every LWP3 hub.
pub const LWP3_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1623_1212_efde_1623_785f_eabc_d123);

/// The single read/write/notify characteristic of [`LWP3_SERVICE_UUID`].
pub const LWP3_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_1624_1212_efde_1623_785f_eabc_d123);

/// Hub hardware families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubKind {
    PoweredUp,
    Boost,
    Duplo,
    CPlus,
}

impl HubKind {
    /// Local name the hub advertises out of the box.
    #[must_use]
    pub fn default_ble_name(self) -> &'static str {
        match self {
            Self::PoweredUp => "HUB NO.4",
            Self::Boost => "LEGO Move Hub",
            Self::Duplo => "Train Base",
            Self::CPlus => "Control+ Hub",
        }
    }

    #[must_use]
    pub fn uart_uuid(self) -> Uuid {
        LWP3_SERVICE_UUID
    }

    #[must_use]
    pub fn char_uuid(self) -> Uuid {
        LWP3_CHARACTERISTIC_UUID
    }
}

impl fmt::Display for HubKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoweredUp => f.write_str("powered_up"),
            Self::Boost => f.write_str("boost"),
            Self::Duplo => f.write_str("duplo"),
            Self::CPlus => f.write_str("c_plus"),
        }
    }
}

/// Error returned when a hub kind string is not recognised.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown hub kind {0}")]
pub struct UnknownHubKind(pub String);

impl FromStr for HubKind {
    type Err = UnknownHubKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "powered_up" => Ok(Self::PoweredUp),
            "boost" => Ok(Self::Boost),
            "duplo" => Ok(Self::Duplo),
            "c_plus" => Ok(Self::CPlus),
            other => Err(UnknownHubKind(other.to_owned())),
        }
    }
}

/// Lifecycle of one hub during one process run.
///
/// `Disconnected → Scanning → Connected → Running → Finished`, where
/// `Finished` is the final disconnected state. Cleanup may move any
/// non-final state straight to `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HubState {
    #[default]
    Disconnected,
    Scanning,
    Connected,
    Running,
    Finished,
}

impl HubState {
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Scanning)
                | (Self::Scanning, Self::Connected)
                | (Self::Connected, Self::Running)
                | (
                    Self::Disconnected | Self::Scanning | Self::Connected | Self::Running,
                    Self::Finished
                )
        )
    }

    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Running)
    }
}

impl fmt::Display for HubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Scanning => f.write_str("scanning"),
            Self::Connected => f.write_str("connected"),
            Self::Running => f.write_str("running"),
            Self::Finished => f.write_str("finished"),
        }
    }
}
