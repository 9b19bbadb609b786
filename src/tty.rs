//! # Handheld Controller TTY Protocol
//!
//! Packet parser for the serial link from a handheld radio controller.
//!
//! Packet layout:
//! ```text
//! "SKYDROID:" | function (1) | length (1) | data (length) | bcc (1)
//! ```
//! The BCC is the XOR of every byte before it, header included.
//! Function `0xB1` carries up to 16 big-endian u16 channel values for bus 1.

use tracing::{debug, trace, warn};

use crate::sbus::protocol::{Channels, SBUS_NUM_CHANNELS};

/// Packet header marker
pub const TTY_HEADER: &[u8; 9] = b"SKYDROID:";

/// Header marker plus function and length bytes
pub const TTY_HEADER_LEN: usize = TTY_HEADER.len() + 2;

/// Channel values for bus 1
pub const FUNC_CHANNELS: u8 = 0xB1;

/// A checksum-verified packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtyPacket {
    pub function: u8,
    pub data: Vec<u8>,
}

impl TtyPacket {
    /// Channel values carried by a [`FUNC_CHANNELS`] packet
    ///
    /// Channels the packet does not cover are left at 0.
    /// Returns `None` for any other function.
    pub fn channels(&self) -> Option<Channels> {
        if self.function != FUNC_CHANNELS {
            return None;
        }

        let mut channels = [0u16; SBUS_NUM_CHANNELS];
        for (slot, pair) in channels.iter_mut().zip(self.data.chunks_exact(2)) {
            *slot = u16::from_be_bytes([pair[0], pair[1]]);
        }
        Some(channels)
    }

    /// Serialize with header and checksum
    ///
    /// Returns `None` when the data does not fit the one-byte length field.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let length = u8::try_from(self.data.len()).ok()?;

        let mut bytes = Vec::with_capacity(TTY_HEADER_LEN + self.data.len() + 1);
        bytes.extend_from_slice(TTY_HEADER);
        bytes.push(self.function);
        bytes.push(length);
        bytes.extend_from_slice(&self.data);
        bytes.push(bcc_sum(&bytes));
        Some(bytes)
    }
}

/// XOR of all bytes
pub fn bcc_sum(data: &[u8]) -> u8 {
    data.iter().fold(0, |sum, byte| sum ^ byte)
}

/// Incremental packet parser
///
/// Bytes may arrive in arbitrary fragments. Garbage between packets is skipped.
#[derive(Debug, Default)]
pub struct TtyParser {
    buffer: Vec<u8>,
    checksum_errors: u64,
}

impl TtyParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every complete packet with a valid checksum
    pub fn push(&mut self, data: &[u8]) -> Vec<TtyPacket> {
        let mut packets = Vec::new();
        for &byte in data {
            if let Some(packet) = self.push_byte(byte) {
                packets.push(packet);
            }
        }
        packets
    }

    /// Feed a single byte
    pub fn push_byte(&mut self, byte: u8) -> Option<TtyPacket> {
        let pos = self.buffer.len();

        if pos < TTY_HEADER.len() {
            if byte == TTY_HEADER[pos] {
                self.buffer.push(byte);
            } else {
                self.resync(byte);
            }
            return None;
        }

        self.buffer.push(byte);
        if self.buffer.len() < TTY_HEADER_LEN {
            return None;
        }

        let length = self.buffer[TTY_HEADER_LEN - 1] as usize;
        let total = TTY_HEADER_LEN + length + 1;
        if self.buffer.len() < total {
            return None;
        }

        let packet = self.finish(total);
        self.buffer.clear();
        packet
    }

    /// Packets discarded for a checksum mismatch
    pub fn checksum_errors(&self) -> u64 {
        self.checksum_errors
    }

    fn finish(&mut self, total: usize) -> Option<TtyPacket> {
        let expected = bcc_sum(&self.buffer[..total - 1]);
        let received = self.buffer[total - 1];

        if expected != received {
            self.checksum_errors += 1;
            warn!(
                "TTY checksum mismatch: expected 0x{:02X}, got 0x{:02X}, packet ignored",
                expected, received
            );
            return None;
        }

        let packet = TtyPacket {
            function: self.buffer[TTY_HEADER.len()],
            data: self.buffer[TTY_HEADER_LEN..total - 1].to_vec(),
        };
        trace!(
            "TTY packet function 0x{:02X}, {} data bytes",
            packet.function,
            packet.data.len()
        );
        Some(packet)
    }

    // A mismatch inside the header may itself start a new header
    fn resync(&mut self, byte: u8) {
        if !self.buffer.is_empty() {
            debug!("TTY header broken after {} bytes", self.buffer.len());
        }
        self.buffer.clear();
        if byte == TTY_HEADER[0] {
            self.buffer.push(byte);
        }
    }
}
