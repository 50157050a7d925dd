//! # brickhub-adapter-lwp3
//!
//! [`MessageCodec`] for the LEGO Wireless Protocol 3.
//!
//! ## Inbound
//!
//! | Type | Meaning | Decoded as |
//! |------|---------|------------|
//! | `0x04` | attached I/O | `Attached { device_type }` / `Detached` |
//! | `0x45` | port value (single) | `Value`, little-endian signed |
//! | `0x01` | hub property: button update | `Value` on the intrinsic port |
//! | `0x01..=0x05`, `0x43`, `0x44`, `0x47`, `0x82` | acknowledgements | `Status` |
//!
//! Every inbound frame is length-checked before it is looked at.
//!
//! ## Outbound
//!
//! Payloads are `[hub id, message type, (port), parameters..]`. Hub-level
//! messages carry no port byte. The outbound queue adds the length prefix.

mod message;

use brickhub_app::ports::MessageCodec;
use brickhub_domain::error::DecodeError;
use brickhub_domain::event::{CommandKind, DecodedEvent, EventKind, SensorValue};
use brickhub_domain::frame::Frame;
use brickhub_domain::port::Port;

pub use message::MessageType;
use message::{hub_property, io_event};

/// Every message in a single-hub network addresses hub 0.
const HUB_ID: u8 = 0x00;

/// Length of an attached-I/O frame announcing a device.
const ATTACH_FRAME_LEN: usize = 15;

/// Stateless LWP3 encoder/decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lwp3Codec;

impl Lwp3Codec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn message_type(kind: CommandKind) -> MessageType {
    match kind {
        CommandKind::HubProperty => MessageType::HubProperties,
        CommandKind::HubAction => MessageType::HubActions,
        CommandKind::PortInputFormat => MessageType::PortInputFormatSetup,
        CommandKind::PortOutput => MessageType::PortOutputCommand,
    }
}

fn decode_attached_io(body: &[u8]) -> Result<DecodedEvent, DecodeError> {
    let truncated = || DecodeError::Truncated(MessageType::HubAttachedIo.as_byte());
    let (&port, rest) = body.split_first().ok_or_else(truncated)?;
    let (&event, rest) = rest.split_first().ok_or_else(truncated)?;
    let port = Port::new(port);

    match event {
        io_event::DETACHED => Ok(DecodedEvent::detached(port)),
        io_event::ATTACHED | io_event::ATTACHED_VIRTUAL => {
            let [lo, hi, ..] = rest else {
                return Err(truncated());
            };
            Ok(DecodedEvent::attached(port, u16::from_le_bytes([*lo, *hi])))
        }
        other => {
            tracing::debug!(%port, event = other, "unknown attached-I/O event");
            Ok(status(port))
        }
    }
}

fn decode_port_value(body: &[u8]) -> Result<DecodedEvent, DecodeError> {
    let (&port, raw) = body
        .split_first()
        .ok_or(DecodeError::Truncated(MessageType::PortValueSingle.as_byte()))?;
    Ok(DecodedEvent::value(Port::new(port), decode_value(raw)?))
}

fn decode_value(raw: &[u8]) -> Result<SensorValue, DecodeError> {
    let value = match *raw {
        [a] => SensorValue::Int(i64::from(i8::from_le_bytes([a]))),
        [a, b] => SensorValue::Int(i64::from(i16::from_le_bytes([a, b]))),
        [a, b, c, d] => SensorValue::Int(i64::from(i32::from_le_bytes([a, b, c, d]))),
        // RGB-style readings: three signed 16-bit channels.
        [r0, r1, g0, g1, b0, b1] => SensorValue::Ints(vec![
            i64::from(i16::from_le_bytes([r0, r1])),
            i64::from(i16::from_le_bytes([g0, g1])),
            i64::from(i16::from_le_bytes([b0, b1])),
        ]),
        [] => return Err(DecodeError::Truncated(MessageType::PortValueSingle.as_byte())),
        _ => return Err(DecodeError::UnsupportedWidth(raw.len())),
    };
    Ok(value)
}

fn decode_hub_property(body: &[u8]) -> Result<DecodedEvent, DecodeError> {
    match *body {
        [hub_property::BUTTON, hub_property::UPDATE, pressed, ..] => Ok(DecodedEvent::value(
            Port::INTRINSIC,
            SensorValue::Bool(pressed != 0),
        )),
        [_, _, ..] => Ok(status(Port::INTRINSIC)),
        _ => Err(DecodeError::Truncated(MessageType::HubProperties.as_byte())),
    }
}

fn status(port: Port) -> DecodedEvent {
    DecodedEvent {
        port,
        kind: EventKind::Status,
        value: SensorValue::None,
    }
}

fn port_status(body: &[u8]) -> DecodedEvent {
    status(body.first().copied().map_or(Port::INTRINSIC, Port::new))
}

impl MessageCodec for Lwp3Codec {
    fn encode(&self, kind: CommandKind, port: Port, parameters: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(parameters.len() + 3);
        payload.push(HUB_ID);
        payload.push(message_type(kind).as_byte());
        match kind {
            CommandKind::HubProperty | CommandKind::HubAction => {}
            CommandKind::PortInputFormat | CommandKind::PortOutput => {
                payload.push(port.number());
            }
        }
        payload.extend_from_slice(parameters);
        payload
    }

    fn decode(&self, bytes: &[u8]) -> Result<DecodedEvent, DecodeError> {
        let frame = Frame::parse(bytes)?;
        let [_hub, message, body @ ..] = frame.payload() else {
            return Err(DecodeError::Truncated(0x00));
        };

        match MessageType::from_byte(*message) {
            Some(MessageType::HubAttachedIo) => decode_attached_io(body),
            Some(MessageType::PortValueSingle) => decode_port_value(body),
            Some(MessageType::HubProperties) => decode_hub_property(body),
            Some(
                MessageType::HubActions | MessageType::HubAlerts | MessageType::GenericError,
            ) => Ok(status(Port::INTRINSIC)),
            Some(
                MessageType::PortInformation
                | MessageType::PortModeInformation
                | MessageType::PortInputFormatSingle
                | MessageType::PortOutputFeedback,
            ) => Ok(port_status(body)),
            Some(
                MessageType::PortInformationRequest
                | MessageType::PortModeInformationRequest
                | MessageType::PortInputFormatSetup
                | MessageType::PortOutputCommand,
            )
            | None => Err(DecodeError::UnsupportedMessage(*message)),
        }
    }

    fn attach_frame(&self, port: Port, device_type: u16) -> Vec<u8> {
        let [lo, hi] = device_type.to_le_bytes();
        let mut bytes = vec![0u8; ATTACH_FRAME_LEN];
        bytes[..7].copy_from_slice(&[
            15,
            HUB_ID,
            MessageType::HubAttachedIo.as_byte(),
            port.number(),
            io_event::ATTACHED,
            lo,
            hi,
        ]);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use brickhub_domain::error::FrameError;

    use super::*;

    fn decode(bytes: &[u8]) -> Result<DecodedEvent, DecodeError> {
        Lwp3Codec::new().decode(bytes)
    }

    #[test]
    fn should_decode_attached_motor() {
        let event = decode(&[15, 0, 0x04, 0x00, 0x01, 0x2E, 0x00, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(event, DecodedEvent::attached(Port::new(0), 0x2E));
    }

    #[test]
    fn should_decode_virtual_attach_as_attach() {
        let event = decode(&[9, 0, 0x04, 0x10, 0x02, 0x2E, 0x00, 0x00, 0x01]).unwrap();
        assert_eq!(event.kind, EventKind::Attached { device_type: 0x2E });
        assert_eq!(event.port, Port::new(0x10));
    }

    #[test]
    fn should_decode_detach() {
        assert_eq!(
            decode(&[5, 0, 0x04, 0x01, 0x00]).unwrap(),
            DecodedEvent::detached(Port::new(1))
        );
    }

    #[test]
    fn should_reject_attach_without_device_type() {
        assert_eq!(
            decode(&[6, 0, 0x04, 0x01, 0x01, 0x2E]),
            Err(DecodeError::Truncated(0x04))
        );
    }

    #[test]
    fn should_decode_signed_values_of_each_width() {
        assert_eq!(
            decode(&[5, 0, 0x45, 0x02, 0xFF]).unwrap().value,
            SensorValue::Int(-1)
        );
        assert_eq!(
            decode(&[6, 0, 0x45, 0x02, 0x2C, 0x01]).unwrap().value,
            SensorValue::Int(300)
        );
        assert_eq!(
            decode(&[8, 0, 0x45, 0x02, 0xD3, 0xFF, 0xFF, 0xFF]).unwrap().value,
            SensorValue::Int(-45)
        );
    }

    #[test]
    fn should_decode_three_channel_reading() {
        let event = decode(&[10, 0, 0x45, 0x01, 0x10, 0x00, 0x20, 0x00, 0x30, 0x00]).unwrap();
        assert_eq!(event.value, SensorValue::Ints(vec![16, 32, 48]));
    }

    #[test]
    fn should_reject_odd_value_width() {
        assert_eq!(
            decode(&[7, 0, 0x45, 0x01, 1, 2, 3]),
            Err(DecodeError::UnsupportedWidth(3))
        );
    }

    #[test]
    fn should_decode_button_press_on_intrinsic_port() {
        let pressed = decode(&[6, 0, 0x01, 0x02, 0x06, 0x01]).unwrap();
        assert_eq!(pressed, DecodedEvent::value(Port::INTRINSIC, SensorValue::Bool(true)));
        let released = decode(&[6, 0, 0x01, 0x02, 0x06, 0x00]).unwrap();
        assert_eq!(released.value, SensorValue::Bool(false));
    }

    #[test]
    fn should_treat_acknowledgements_as_status() {
        let ack = decode(&[10, 0, 0x47, 0x00, 0x00, 1, 0, 0, 0, 1]).unwrap();
        assert_eq!(ack.kind, EventKind::Status);
        assert_eq!(ack.port, Port::new(0));
        let feedback = decode(&[5, 0, 0x82, 0x32, 0x0A]).unwrap();
        assert_eq!(feedback.kind, EventKind::Status);
        let battery = decode(&[6, 0, 0x01, 0x06, 0x06, 0x64]).unwrap();
        assert_eq!(battery.kind, EventKind::Status);
    }

    #[test]
    fn should_reject_unknown_message_type() {
        assert_eq!(
            decode(&[4, 0, 0x99, 0x00]),
            Err(DecodeError::UnsupportedMessage(0x99))
        );
    }

    #[test]
    fn should_reject_bad_length_prefix_before_looking_inside() {
        assert_eq!(
            decode(&[9, 0, 0x45, 0x00, 0x01]),
            Err(DecodeError::Frame(FrameError::LengthMismatch {
                declared: 9,
                actual: 5
            }))
        );
        assert_eq!(decode(&[2, 0]), Err(DecodeError::Truncated(0x00)));
    }

    #[test]
    fn should_encode_port_output_with_port() {
        let payload = Lwp3Codec::new().encode(
            CommandKind::PortOutput,
            Port::HUB_LED,
            &[0x11, 0x51, 0x00, 0x09],
        );
        assert_eq!(payload, vec![0x00, 0x81, 50, 0x11, 0x51, 0x00, 0x09]);
    }

    #[test]
    fn should_encode_hub_messages_without_port() {
        let codec = Lwp3Codec::new();
        assert_eq!(
            codec.encode(CommandKind::HubProperty, Port::INTRINSIC, &[0x02, 0x02]),
            vec![0x00, 0x01, 0x02, 0x02]
        );
        assert_eq!(
            codec.encode(CommandKind::HubAction, Port::INTRINSIC, &[0x01]),
            vec![0x00, 0x02, 0x01]
        );
        assert_eq!(
            codec.encode(CommandKind::PortInputFormat, Port::new(1), &[0, 1, 0, 0, 0, 1]),
            vec![0x00, 0x41, 0x01, 0, 1, 0, 0, 0, 1]
        );
    }

    #[test]
    fn should_build_attach_frame_it_can_decode() {
        let codec = Lwp3Codec::new();
        let frame = codec.attach_frame(Port::INTRINSIC, 0x0005);
        assert_eq!(
            frame,
            vec![15, 0x00, 0x04, 255, 1, 0x05, 0x00, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            codec.decode(&frame).unwrap(),
            DecodedEvent::attached(Port::INTRINSIC, 5)
        );
    }
}
