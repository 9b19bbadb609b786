//! # SBUS Frame Encoder
//!
//! Packs 16 channel values into a 25-byte SBUS frame.

use super::protocol::*;

/// Encode 16 channels into a complete SBUS frame
///
/// # Arguments
///
/// * `channels` - Array of 16 channel values (11-bit: 0-2047)
///
/// # Returns
///
/// * `SbusFrame` - 25 bytes: start marker + 22-byte payload + flags + end marker
///
/// # Examples
///
/// ```
/// use rc_bridge::sbus::encoder::encode;
///
/// let frame = encode(&[1024u16; 16]);
/// assert_eq!(frame[0], 0x0F);
/// assert_eq!(frame[24], 0x00);
/// ```
pub fn encode(channels: &Channels) -> SbusFrame {
    let mut frame = [0u8; SBUS_FRAME_LEN];
    frame[0] = SBUS_START_BYTE;
    pack_channels(channels, &mut frame[1..1 + SBUS_PAYLOAD_SIZE]);
    frame[SBUS_FLAGS_INDEX] = 0x00;
    frame[SBUS_FRAME_LEN - 1] = SBUS_END_BYTE;
    frame
}

/// Pack channels into the 22-byte payload area
///
/// Channels are packed as a continuous bitstream, LSB first. Channel `i`
/// occupies bits `11*i ..= 11*i + 10` of the stream:
/// ```text
/// Byte 0: Ch1[0:7]
/// Byte 1: Ch1[8:10] | Ch2[0:4]
/// Byte 2: Ch2[5:10] | Ch3[0:1]
/// ...
/// ```
///
/// Values above 2047 are clamped rather than masked so an oversized value
/// can never bleed into the neighbouring channel.
fn pack_channels(channels: &Channels, payload: &mut [u8]) {
    let mut acc: u32 = 0;
    let mut acc_bits = 0;
    let mut out = 0;

    for &channel in channels {
        acc |= u32::from(clamp_channel_value(channel)) << acc_bits;
        acc_bits += SBUS_CHANNEL_BITS;

        while acc_bits >= 8 {
            payload[out] = (acc & 0xFF) as u8;
            acc >>= 8;
            acc_bits -= 8;
            out += 1;
        }
    }
}

/// Clamp a channel value to valid SBUS range (0-2047)
pub fn clamp_channel_value(value: u16) -> u16 {
    value.min(SBUS_CHANNEL_VALUE_MAX)
}
