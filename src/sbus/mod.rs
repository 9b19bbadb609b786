//! # SBUS Protocol Module
//!
//! Implementation of the SBUS wire format used on both ends of the link.
//!
//! This module handles:
//! - Frame encoding (16 channels, 11-bit resolution, LSB-first)
//! - Frame decoding with start/end marker validation
//! - Frame resynchronization on noisy serial byte streams
//! - The 26-byte UDP envelope between ground and air units

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod envelope;
pub mod sync;
