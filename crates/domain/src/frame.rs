//! Frame: one length-prefixed protocol message.
//!
//! The first byte holds the total frame length (payload length + 1), so a
//! frame can carry at most 254 payload bytes. Larger payloads are rejected,
//! never truncated.

use crate::error::FrameError;

/// Largest payload a one-byte length prefix can address.
pub const MAX_PAYLOAD: usize = 254;

/// A validated frame: `[len(payload) + 1] ++ payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Prepend the length byte to `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::PayloadTooLarge`] when `payload` is longer than
    /// [`MAX_PAYLOAD`].
    pub fn new(payload: &[u8]) -> Result<Self, FrameError> {
        let length = u8::try_from(payload.len() + 1).map_err(|_| FrameError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD,
        })?;

        let mut bytes = Vec::with_capacity(payload.len() + 1);
        bytes.push(length);
        bytes.extend_from_slice(payload);
        Ok(Self { bytes })
    }

    /// Validate raw bytes whose first byte is the length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Empty`] for an empty slice and
    /// [`FrameError::LengthMismatch`] when the prefix disagrees with the
    /// actual byte count.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let (&declared, _) = bytes.split_first().ok_or(FrameError::Empty)?;
        if usize::from(declared) != bytes.len() {
            return Err(FrameError::LengthMismatch {
                declared: usize::from(declared),
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// The payload without the length prefix.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.bytes[1..]
    }

    /// The full wire representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total length on the wire (payload + 1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Frames always carry their length byte, so they are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_prepend_length_byte() {
        let frame = Frame::new(&[0x00, 0x81, 0x32, 0x11]).unwrap();
        assert_eq!(frame.as_bytes(), &[5, 0x00, 0x81, 0x32, 0x11]);
        assert_eq!(frame.len(), 5);
        assert_eq!(frame.payload(), &[0x00, 0x81, 0x32, 0x11]);
    }

    #[test]
    fn should_frame_empty_payload_as_single_byte() {
        let frame = Frame::new(&[]).unwrap();
        assert_eq!(frame.as_bytes(), &[1]);
    }

    #[test]
    fn should_accept_payload_at_ceiling() {
        let payload = vec![0xAB; MAX_PAYLOAD];
        let frame = Frame::new(&payload).unwrap();
        assert_eq!(frame.len(), 255);
        assert_eq!(frame.as_bytes()[0], 255);
    }

    #[test]
    fn should_reject_payload_above_ceiling() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert_eq!(
            Frame::new(&payload),
            Err(FrameError::PayloadTooLarge { len: 255, max: 254 })
        );
    }

    #[test]
    fn should_reject_far_oversized_payload() {
        let payload = vec![0u8; 1024];
        assert!(matches!(
            Frame::new(&payload),
            Err(FrameError::PayloadTooLarge { len: 1024, .. })
        ));
    }

    #[test]
    fn should_parse_consistent_frame() {
        let frame = Frame::parse(&[3, 0x00, 0x04]).unwrap();
        assert_eq!(frame.payload(), &[0x00, 0x04]);
    }

    #[test]
    fn should_reject_length_mismatch_when_parsing() {
        assert_eq!(
            Frame::parse(&[9, 0x00, 0x04]),
            Err(FrameError::LengthMismatch {
                declared: 9,
                actual: 3
            })
        );
    }

    #[test]
    fn should_reject_empty_slice_when_parsing() {
        assert_eq!(Frame::parse(&[]), Err(FrameError::Empty));
    }
}
