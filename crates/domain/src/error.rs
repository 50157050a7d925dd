//! Common error types used across the workspace.
//!
//! Every layer defines its own typed errors and converts into [`BrickError`]
//! via `#[from]` (or an explicit `into_domain()` for adapter crates).

use crate::hub::HubState;
use crate::port::Port;

/// Top-level error for every brickhub operation.
#[derive(Debug, thiserror::Error)]
pub enum BrickError {
    /// The declared hub/peripheral wiring is wrong. Never retried.
    #[error("configuration error")]
    Configuration(#[from] ConfigurationError),

    /// A frame could not be built or parsed.
    #[error("frame error")]
    Frame(#[from] FrameError),

    /// Inbound bytes could not be decoded into an event.
    #[error("decode error")]
    Decode(#[from] DecodeError),

    /// A device or peripheral could not be found.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// The BLE backend reported a failure.
    #[error("transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A hub control routine returned an error.
    #[error("control routine of hub {hub} failed")]
    Control {
        hub: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The operation observed a cancellation request and unwound.
    #[error("operation cancelled")]
    Cancelled,
}

impl BrickError {
    /// Wrap any error coming out of a user control routine.
    pub fn control(
        hub: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Control {
            hub: hub.into(),
            source: source.into(),
        }
    }

    /// Whether this error is the cooperative cancellation marker.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Wiring mistakes detected at composition or connect time.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("hub type {hub} has no change handler for sensing peripheral {peripheral}")]
    MissingChangeHandler { hub: String, peripheral: String },

    #[error("signal {signal} is not supported by {sender}")]
    UnknownSignal { sender: String, signal: String },

    #[error("peripheral name {0} is declared twice on the same hub")]
    DuplicatePeripheral(String),

    #[error("peripheral {0} needs a port")]
    MissingPort(String),

    #[error("port {port} is used by both {first} and {second}")]
    PortInUse {
        port: Port,
        first: String,
        second: String,
    },

    #[error("name must not be empty")]
    EmptyName,

    #[error("hub {hub} cannot go from {from} to {to}")]
    InvalidTransition {
        hub: String,
        from: HubState,
        to: HubState,
    },

    #[error("hub {0} is not connected")]
    NotConnected(String),

    #[error("hub registry is sealed, hub {0} was created after setup")]
    RegistrySealed(String),
}

/// Violations of the one-byte length prefix framing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload of {len} bytes exceeds the {max} byte frame ceiling")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("length byte says {declared} but frame has {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("frame is empty")]
    Empty,
}

/// Reasons an inbound frame could not be turned into a
/// [`DecodedEvent`](crate::event::DecodedEvent).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed frame")]
    Frame(#[from] FrameError),

    #[error("message type 0x{0:02x} is too short")]
    Truncated(u8),

    #[error("unsupported message type 0x{0:02x}")]
    UnsupportedMessage(u8),

    #[error("unexpected value width {0}")]
    UnsupportedWidth(usize),
}

/// The requested thing does not exist.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_configuration_error_with_from() {
        let err: BrickError = ConfigurationError::EmptyName.into();
        assert!(matches!(
            err,
            BrickError::Configuration(ConfigurationError::EmptyName)
        ));
    }

    #[test]
    fn should_display_missing_change_handler() {
        let err = ConfigurationError::MissingChangeHandler {
            hub: "truck".to_string(),
            peripheral: "hub_btn".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "hub type truck has no change handler for sensing peripheral hub_btn"
        );
    }

    #[test]
    fn should_display_payload_too_large() {
        let err = FrameError::PayloadTooLarge { len: 300, max: 254 };
        assert_eq!(
            err.to_string(),
            "payload of 300 bytes exceeds the 254 byte frame ceiling"
        );
    }

    #[test]
    fn should_display_not_found() {
        let err = NotFoundError {
            entity: "Device",
            id: "Technic Hub".to_string(),
        };
        assert_eq!(err.to_string(), "Device Technic Hub not found");
    }

    #[test]
    fn should_wrap_control_error_with_hub_name() {
        let err = BrickError::control("truck", "motor stalled");
        assert_eq!(err.to_string(), "control routine of hub truck failed");
        assert!(!err.is_cancelled());
        assert!(BrickError::Cancelled.is_cancelled());
    }

    #[test]
    fn should_convert_frame_error_into_decode_error() {
        let err: DecodeError = FrameError::Empty.into();
        assert_eq!(err, DecodeError::Frame(FrameError::Empty));
    }
}
