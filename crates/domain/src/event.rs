//! Event: what the codec makes of one inbound frame, and the command kinds
//! it can encode for the outbound direction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::port::Port;

/// A typed event decoded from one inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub port: Port,
    pub kind: EventKind,
    pub value: SensorValue,
}

impl DecodedEvent {
    #[must_use]
    pub fn attached(port: Port, device_type: u16) -> Self {
        Self {
            port,
            kind: EventKind::Attached { device_type },
            value: SensorValue::None,
        }
    }

    #[must_use]
    pub fn detached(port: Port) -> Self {
        Self {
            port,
            kind: EventKind::Detached,
            value: SensorValue::None,
        }
    }

    #[must_use]
    pub fn value(port: Port, value: SensorValue) -> Self {
        Self {
            port,
            kind: EventKind::Value,
            value,
        }
    }
}

/// What happened on the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A peripheral was plugged in (or synthesised for intrinsic ones).
    Attached { device_type: u16 },
    /// A peripheral was removed.
    Detached,
    /// A sensor reading for the port's active capability.
    Value,
    /// Acknowledgement/feedback with nothing to route.
    Status,
}

/// A decoded reading.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Ints(Vec<i64>),
}

impl SensorValue {
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Ints(values) => values.first().copied(),
            Self::None => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(v) => Some(*v != 0),
            _ => None,
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("-"),
            Self::Bool(b) => b.fmt(f),
            Self::Int(v) => v.fmt(f),
            Self::Ints(values) => write!(f, "{values:?}"),
        }
    }
}

/// Outbound message families the codec knows how to encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Hub property request/subscription (no port).
    HubProperty,
    /// Hub-level action such as switching off (no port).
    HubAction,
    /// Configure which mode a port reports and whether it notifies.
    PortInputFormat,
    /// Drive an output (motor power, LED colour, ...).
    PortOutput,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HubProperty => f.write_str("hub_property"),
            Self::HubAction => f.write_str("hub_action"),
            Self::PortInputFormat => f.write_str("port_input_format"),
            Self::PortOutput => f.write_str("port_output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_attach_event_without_value() {
        let event = DecodedEvent::attached(Port::INTRINSIC, 5);
        assert_eq!(event.kind, EventKind::Attached { device_type: 5 });
        assert_eq!(event.value, SensorValue::None);
    }

    #[test]
    fn should_read_first_of_multiple_ints() {
        assert_eq!(SensorValue::Ints(vec![4, 5]).as_int(), Some(4));
    }

    #[test]
    fn should_read_int_as_bool() {
        assert_eq!(SensorValue::Int(1).as_bool(), Some(true));
        assert_eq!(SensorValue::Int(0).as_bool(), Some(false));
        assert_eq!(SensorValue::None.as_bool(), None);
    }

    #[test]
    fn should_display_values() {
        assert_eq!(SensorValue::Int(-45).to_string(), "-45");
        assert_eq!(SensorValue::None.to_string(), "-");
        assert_eq!(CommandKind::PortOutput.to_string(), "port_output");
    }
}
