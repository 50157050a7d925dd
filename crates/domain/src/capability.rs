//! Capability: a named behaviour a peripheral exposes.
//!
//! Names starting with [`SENSING_MARKER`] are sensing capabilities: the hub
//! must provide a change handler for the owning peripheral. Every other name
//! is treated as an actuation capability. Unknown names are accepted as-is.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix that marks a capability as sensing.
pub const SENSING_MARKER: &str = "sense_";

/// A capability name such as `sense_pos` or `set_speed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_sensing(&self) -> bool {
        self.0.starts_with(SENSING_MARKER)
    }

    /// Name of the capability-scoped change signal (`change::<name>`).
    #[must_use]
    pub fn change_signal(&self) -> String {
        format!("change::{}", self.0)
    }
}

impl From<&str> for Capability {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_detect_sensing_prefix() {
        assert!(Capability::from("sense_pos").is_sensing());
        assert!(Capability::from("sense_press").is_sensing());
    }

    #[test]
    fn should_treat_other_names_as_actuation() {
        assert!(!Capability::from("set_speed").is_sensing());
        assert!(!Capability::from("sensor").is_sensing());
    }

    #[test]
    fn should_build_scoped_change_signal() {
        assert_eq!(Capability::from("sense_pos").change_signal(), "change::sense_pos");
    }
}
