//! # Telemetry Module
//!
//! Records link quality observations to JSONL files with rotation.
//!
//! This module handles:
//! - Turning each radio status observation into a [`LinkRecord`]
//! - Formatting records as JSONL (JSON Lines)
//! - Rotating files after N records and retaining only the last M files

pub mod logger;
pub mod types;

pub use logger::TelemetryLogger;
pub use types::LinkRecord;
