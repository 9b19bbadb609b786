//! # SBUS Frame Decoder
//!
//! Unpacks 16 channel values from a marker-valid 25-byte SBUS frame.

use super::protocol::*;

/// Decode a complete SBUS frame
///
/// # Arguments
///
/// * `frame` - 25-byte SBUS frame
///
/// # Returns
///
/// * `Result<Channels, FrameError>` - The 16 channel values
///
/// # Errors
///
/// Returns `FrameError::BadMarker` if byte 0 is not `0x0F` or byte 24 is not
/// `0x00`. The flag byte is not interpreted.
pub fn decode(frame: &SbusFrame) -> Result<Channels, FrameError> {
    check_markers(frame)?;
    Ok(unpack_channels(&frame[1..1 + SBUS_PAYLOAD_SIZE]))
}

/// Decode an untyped buffer that should hold exactly one SBUS frame
///
/// # Errors
///
/// Returns `FrameError::WrongLength` if `bytes` is not 25 bytes long, otherwise
/// the same errors as [`decode`].
pub fn decode_slice(bytes: &[u8]) -> Result<Channels, FrameError> {
    let frame: &SbusFrame = bytes
        .try_into()
        .map_err(|_| FrameError::WrongLength(bytes.len()))?;
    decode(frame)
}

/// Check start and end markers of a frame
pub fn check_markers(frame: &SbusFrame) -> Result<(), FrameError> {
    let start = frame[0];
    let end = frame[SBUS_FRAME_LEN - 1];

    if start != SBUS_START_BYTE || end != SBUS_END_BYTE {
        return Err(FrameError::BadMarker { start, end });
    }

    Ok(())
}

fn unpack_channels(payload: &[u8]) -> Channels {
    let mut channels = [0u16; SBUS_NUM_CHANNELS];
    let mut acc: u32 = 0;
    let mut acc_bits = 0;
    let mut bytes = payload.iter();

    for channel in channels.iter_mut() {
        while acc_bits < SBUS_CHANNEL_BITS {
            // payload is exactly 176 bits, so this never runs dry
            let byte = bytes.next().copied().unwrap_or(0);
            acc |= u32::from(byte) << acc_bits;
            acc_bits += 8;
        }

        *channel = (acc & u32::from(SBUS_CHANNEL_VALUE_MAX)) as u16;
        acc >>= SBUS_CHANNEL_BITS;
        acc_bits -= SBUS_CHANNEL_BITS;
    }

    channels
}

/// Render channel values as fixed-width columns for debug logs
pub fn format_channels(channels: &Channels) -> String {
    channels
        .iter()
        .map(|value| format!("{:4}", value))
        .collect::<Vec<_>>()
        .join(" ")
}
