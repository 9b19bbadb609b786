//! # RC Bridge Library
//!
//! Control link core for an RC bridge between a ground unit and an air unit.
//!
//! This library provides:
//! - SBUS frame encoding, decoding and byte-stream resynchronization
//! - PPM pulse width conversion
//! - A shared per-bus channel table
//! - Link quality filtering with hysteresis-based failsafe
//! - A fixed-rate transmit scheduler over serial or UDP outputs
//! - Air and ground services wiring all of the above together

pub mod channels;
pub mod config;
pub mod error;
pub mod link;
pub mod ppm;
pub mod sbus;
pub mod scheduler;
pub mod serial;
pub mod service;
pub mod telemetry;
pub mod tty;
