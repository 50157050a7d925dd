//! LWP3 message type catalogue (the third byte of every frame).

use std::fmt;

/// Message types the codec knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    HubProperties = 0x01,
    HubActions = 0x02,
    HubAlerts = 0x03,
    HubAttachedIo = 0x04,
    GenericError = 0x05,
    PortInformationRequest = 0x21,
    PortModeInformationRequest = 0x22,
    PortInputFormatSetup = 0x41,
    PortInformation = 0x43,
    PortModeInformation = 0x44,
    PortValueSingle = 0x45,
    PortInputFormatSingle = 0x47,
    PortOutputCommand = 0x81,
    PortOutputFeedback = 0x82,
}

impl MessageType {
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x01 => Self::HubProperties,
            0x02 => Self::HubActions,
            0x03 => Self::HubAlerts,
            0x04 => Self::HubAttachedIo,
            0x05 => Self::GenericError,
            0x21 => Self::PortInformationRequest,
            0x22 => Self::PortModeInformationRequest,
            0x41 => Self::PortInputFormatSetup,
            0x43 => Self::PortInformation,
            0x44 => Self::PortModeInformation,
            0x45 => Self::PortValueSingle,
            0x47 => Self::PortInputFormatSingle,
            0x81 => Self::PortOutputCommand,
            0x82 => Self::PortOutputFeedback,
            _ => return None,
        })
    }

    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}(0x{:02x})", self.as_byte())
    }
}

/// Events carried by [`MessageType::HubAttachedIo`].
pub mod io_event {
    pub const DETACHED: u8 = 0x00;
    pub const ATTACHED: u8 = 0x01;
    pub const ATTACHED_VIRTUAL: u8 = 0x02;
}

/// Hub property ids and operations used by the codec.
pub mod hub_property {
    pub const BUTTON: u8 = 0x02;
    pub const UPDATE: u8 = 0x06;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_every_known_byte_back_to_itself() {
        for byte in 0..=u8::MAX {
            if let Some(kind) = MessageType::from_byte(byte) {
                assert_eq!(kind.as_byte(), byte);
            }
        }
    }

    #[test]
    fn should_reject_unknown_bytes() {
        assert_eq!(MessageType::from_byte(0x00), None);
        assert_eq!(MessageType::from_byte(0xFF), None);
    }
}
