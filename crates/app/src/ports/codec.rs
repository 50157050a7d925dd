//! Codec port: turns commands into payload bytes and inbound frames into
//! [`DecodedEvent`]s.
//!
//! The catalogue of message layouts lives in an adapter crate; the core only
//! relies on this contract.

use brickhub_domain::error::DecodeError;
use brickhub_domain::event::{CommandKind, DecodedEvent};
use brickhub_domain::port::Port;

/// Byte-level protocol codec shared by every hub.
pub trait MessageCodec: Send + Sync {
    /// Encode one outbound command. The result is a payload: the outbound
    /// queue adds the length prefix.
    fn encode(&self, kind: CommandKind, port: Port, parameters: &[u8]) -> Vec<u8>;

    /// Decode one inbound frame (length prefix included).
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for malformed or unsupported frames.
    fn decode(&self, bytes: &[u8]) -> Result<DecodedEvent, DecodeError>;

    /// A complete inbound frame announcing `device_type` on `port`, used to
    /// replay the attachment of hub-intrinsic peripherals.
    fn attach_frame(&self, port: Port, device_type: u16) -> Vec<u8>;
}
