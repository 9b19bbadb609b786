//! Telemetry record types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::link::LinkReport;

/// One link observation as written to the telemetry log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRecord {
    pub timestamp: DateTime<Utc>,
    pub sample_rssi: i32,
    pub sample_snr: i32,
    pub rssi: f64,
    pub snr: f64,
    pub failsafe_active: bool,
}

impl LinkRecord {
    /// Stamp a report with the current time
    pub fn now(report: &LinkReport) -> Self {
        Self::at(Utc::now(), report)
    }

    pub fn at(timestamp: DateTime<Utc>, report: &LinkReport) -> Self {
        Self {
            timestamp,
            sample_rssi: report.sample_rssi,
            sample_snr: report.sample_snr,
            rssi: report.rssi,
            snr: report.snr,
            failsafe_active: report.failsafe_active,
        }
    }
}
