//! # SBUS Protocol Constants and Types
//!
//! Core protocol definitions for SBUS frames and the UDP envelope that carries
//! them between the ground and air units.

use thiserror::Error;

/// SBUS frame start marker
pub const SBUS_START_BYTE: u8 = 0x0F;

/// SBUS frame end marker
pub const SBUS_END_BYTE: u8 = 0x00;

/// SBUS frame length: start(1) + payload(22) + flags(1) + end(1)
pub const SBUS_FRAME_LEN: usize = 25;

/// Packed channel payload size (16 channels × 11 bits = 176 bits)
pub const SBUS_PAYLOAD_SIZE: usize = 22;

/// Offset of the flag byte. Always written as zero, never interpreted.
pub const SBUS_FLAGS_INDEX: usize = 23;

/// SBUS line rate (8E2, inverted on the wire by the UART hardware)
pub const SBUS_BAUD_RATE: u32 = 100_000;

/// Number of analog channels per frame
pub const SBUS_NUM_CHANNELS: usize = 16;

/// Bits per channel
pub const SBUS_CHANNEL_BITS: usize = 11;

/// Channel value range (11-bit: 0-2047)
pub const SBUS_CHANNEL_VALUE_MIN: u16 = 0;
pub const SBUS_CHANNEL_VALUE_MAX: u16 = 2047;
pub const SBUS_CHANNEL_VALUE_CENTER: u16 = 1024;

/// Envelope type bit: payload is an SBUS frame
pub const SBUS_MODE: u8 = 0x20;

/// Envelope type bit: payload came from a PPM source (not produced by this crate)
pub const PPM_MODE: u8 = 0x10;

/// Envelope bit selecting bus 0 or 1
pub const BUS_INDEX_MASK: u8 = 0x01;

/// Envelope length: type_idx(1) + frame(25)
pub const ENVELOPE_LEN: usize = 1 + SBUS_FRAME_LEN;

/// 16 channel values, 11 bits each
pub type Channels = [u16; SBUS_NUM_CHANNELS];

/// Raw SBUS wire frame
pub type SbusFrame = [u8; SBUS_FRAME_LEN];

/// Errors raised while interpreting SBUS bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Start or end marker does not match
    #[error("bad frame markers: start=0x{start:02X}, end=0x{end:02X}")]
    BadMarker { start: u8, end: u8 },

    /// Buffer is not the expected size
    #[error("wrong frame length: {0} bytes")]
    WrongLength(usize),

    /// Envelope type byte does not announce an SBUS payload
    #[error("envelope type 0x{0:02X} is not SBUS")]
    NotSbus(u8),
}
