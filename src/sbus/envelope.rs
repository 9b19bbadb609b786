//! # RC Message Envelope
//!
//! The ground unit sends each SBUS frame to the air unit as a 26-byte UDP
//! datagram:
//!
//! | Offset | Meaning |
//! |--------|---------|
//! | 0 | `type_idx`: bit 0x20 = SBUS payload, bit 0x01 = bus index |
//! | 1-25 | SBUS frame |

use super::decoder::check_markers;
use super::protocol::*;

/// One SBUS frame addressed to bus 0 or 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcMessage {
    /// Zero-based bus index (0 or 1)
    pub bus: u8,
    /// The SBUS frame
    pub frame: SbusFrame,
}

impl RcMessage {
    /// Wrap a frame for the given zero-based bus
    ///
    /// Only the lowest bit of `bus` is kept, matching the single index bit of
    /// the wire format.
    pub fn new(bus: u8, frame: SbusFrame) -> Self {
        Self {
            bus: bus & BUS_INDEX_MASK,
            frame,
        }
    }

    /// The `type_idx` byte for this message
    pub fn type_idx(&self) -> u8 {
        SBUS_MODE | (self.bus & BUS_INDEX_MASK)
    }

    /// Serialize into the 26-byte datagram
    pub fn to_bytes(&self) -> [u8; ENVELOPE_LEN] {
        let mut out = [0u8; ENVELOPE_LEN];
        out[0] = self.type_idx();
        out[1..].copy_from_slice(&self.frame);
        out
    }

    /// Parse a received datagram
    ///
    /// # Errors
    ///
    /// - `WrongLength` if the datagram is not exactly 26 bytes
    /// - `NotSbus` if the SBUS mode bit is not set
    /// - `BadMarker` if the embedded frame has invalid markers
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != ENVELOPE_LEN {
            return Err(FrameError::WrongLength(bytes.len()));
        }

        let type_idx = bytes[0];
        if type_idx & SBUS_MODE == 0 {
            return Err(FrameError::NotSbus(type_idx));
        }

        let mut frame = [0u8; SBUS_FRAME_LEN];
        frame.copy_from_slice(&bytes[1..]);
        check_markers(&frame)?;

        Ok(Self {
            bus: type_idx & BUS_INDEX_MASK,
            frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbus::encoder::encode;

    #[test]
    fn test_type_idx_bits() {
        let frame = encode(&[SBUS_CHANNEL_VALUE_CENTER; 16]);
        assert_eq!(RcMessage::new(0, frame).type_idx(), 0x20);
        assert_eq!(RcMessage::new(1, frame).type_idx(), 0x21);
        // only the index bit survives
        assert_eq!(RcMessage::new(3, frame).bus, 1);
    }

    #[test]
    fn test_to_bytes_layout() {
        let frame = encode(&[100; 16]);
        let bytes = RcMessage::new(1, frame).to_bytes();

        assert_eq!(bytes.len(), 26);
        assert_eq!(bytes[0], 0x21);
        assert_eq!(&bytes[1..], &frame[..]);
    }

    #[test]
    fn test_parse_valid() {
        let frame = encode(&[2000; 16]);
        let msg = RcMessage::parse(&RcMessage::new(1, frame).to_bytes()).unwrap();

        assert_eq!(msg.bus, 1);
        assert_eq!(msg.frame, frame);
    }

    #[test]
    fn test_parse_ignores_other_type_bits() {
        let frame = encode(&[2000; 16]);
        let mut bytes = RcMessage::new(0, frame).to_bytes();
        bytes[0] |= PPM_MODE;

        assert_eq!(RcMessage::parse(&bytes).unwrap().bus, 0);
    }

    #[test]
    fn test_parse_wrong_length() {
        assert_eq!(RcMessage::parse(&[0x20; 25]), Err(FrameError::WrongLength(25)));
    }

    #[test]
    fn test_parse_not_sbus() {
        let frame = encode(&[0; 16]);
        let mut bytes = RcMessage::new(0, frame).to_bytes();
        bytes[0] = PPM_MODE;

        assert_eq!(RcMessage::parse(&bytes), Err(FrameError::NotSbus(PPM_MODE)));
    }

    #[test]
    fn test_parse_bad_marker() {
        let frame = encode(&[0; 16]);
        let mut bytes = RcMessage::new(0, frame).to_bytes();
        bytes[1] = 0xAA;

        assert!(matches!(
            RcMessage::parse(&bytes),
            Err(FrameError::BadMarker { start: 0xAA, .. })
        ));
    }
}
