//! # PPM Conversion Module
//!
//! Converts between PPM pulse widths (microseconds) and SBUS channel values.
//!
//! ## Scale
//!
//! | PPM (µs) | SBUS |
//! |----------|------|
//! | 800-874 | 0 |
//! | 875-2152 | `ceil((ppm - 874 - 0.5) / 0.625)` |
//! | 2153-2200 | 2047 |
//!
//! Both directions fail closed: an out-of-range input yields 0, which for
//! `sbus_to_ppm` is not a valid pulse width and must be treated as an error
//! sentinel by the caller.
//!
//! The two functions are not exact inverses. For every pulse width in
//! 875..=2152, `sbus_to_ppm(ppm_to_sbus(ppm) as i32)` lands within one
//! microsecond of the input.
//!
//! ## Usage
//!
//! ```
//! use rc_bridge::ppm::{ppm_to_sbus, sbus_to_ppm};
//!
//! assert_eq!(ppm_to_sbus(800), 0);
//! assert_eq!(ppm_to_sbus(2200), 2047);
//! assert_eq!(sbus_to_ppm(0), 800);
//! ```

use tracing::warn;

use crate::sbus::protocol::SBUS_CHANNEL_VALUE_MAX;

/// Lowest accepted pulse width
pub const PPM_MIN: i32 = 800;

/// Highest accepted pulse width
pub const PPM_MAX: i32 = 2200;

/// Pulse width that maps to SBUS 0 (inclusive upper edge of the low clamp)
pub const SCALE_OFFSET: i32 = 874;

/// Microseconds per SBUS step
pub const SCALE_FACTOR: f64 = 0.625;

/// First pulse width that saturates to SBUS 2047
const PPM_SATURATE: i32 = 2153;

/// Number of channel values exposed by one PPM input file
pub const PPM_CHANNELS: usize = 8;

/// Convert a PPM pulse width to an SBUS channel value
///
/// Returns 0 (and logs a warning) when `ppm` is outside 800..=2200.
pub fn ppm_to_sbus(ppm: i32) -> u16 {
    if !(PPM_MIN..=PPM_MAX).contains(&ppm) {
        warn!("PPM value {} out of range {}-{}", ppm, PPM_MIN, PPM_MAX);
        return 0;
    }

    if ppm <= SCALE_OFFSET {
        0
    } else if ppm >= PPM_SATURATE {
        SBUS_CHANNEL_VALUE_MAX
    } else {
        let scaled = (f64::from(ppm - SCALE_OFFSET) - 0.5) / SCALE_FACTOR;
        scaled.ceil() as u16
    }
}

/// Convert an SBUS channel value to a PPM pulse width
///
/// Returns 0 (and logs a warning) when `sbus` is outside 0..=2047.
pub fn sbus_to_ppm(sbus: i32) -> i32 {
    if !(0..=i32::from(SBUS_CHANNEL_VALUE_MAX)).contains(&sbus) {
        warn!("SBUS value {} out of range 0-{}", sbus, SBUS_CHANNEL_VALUE_MAX);
        return 0;
    }

    match sbus {
        0 => PPM_MIN,
        s if s == i32::from(SBUS_CHANNEL_VALUE_MAX) => PPM_MAX,
        s => (f64::from(s) * SCALE_FACTOR + f64::from(SCALE_OFFSET) + 0.5) as i32,
    }
}

/// Parse the pulse widths exposed by a PPM input file
///
/// Reads up to 8 whitespace-separated integers and stops at the first token
/// that is not a number.
pub fn parse_ppm_values(text: &str) -> Vec<i32> {
    text.split_whitespace()
        .map_while(|token| token.parse::<i32>().ok())
        .take(PPM_CHANNELS)
        .collect()
}
