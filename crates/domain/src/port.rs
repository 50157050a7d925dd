//! Port: where a peripheral plugs into a hub.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A hub port number as used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Port(u8);

impl Port {
    /// Reserved port used for hub-intrinsic peripherals such as the button.
    pub const INTRINSIC: Self = Self(255);

    /// Port of the built-in RGB light on every LWP3 hub.
    pub const HUB_LED: Self = Self(50);

    #[must_use]
    pub const fn new(number: u8) -> Self {
        Self(number)
    }

    #[must_use]
    pub const fn number(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_intrinsic(self) -> bool {
        self == Self::INTRINSIC
    }
}

impl From<u8> for Port {
    fn from(number: u8) -> Self {
        Self(number)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
