//! # Link Quality Module
//!
//! Turns raw radio status reports into a failsafe decision.
//!
//! ## Filtering
//!
//! Each report carries an RSSI magnitude and a noise-floor magnitude. They
//! are negated into dBm-like values and the SNR is derived from them:
//!
//! ```text
//! rssi = -rssi_raw
//! snr  = rssi - (-noise_raw)
//! ```
//!
//! RSSI and SNR then go through a single-pole low-pass filter
//! (`filtered = filtered * (1 - α) + sample * α`), seeded from the first
//! report.
//!
//! ## Hysteresis
//!
//! | Condition | Result |
//! |-----------|--------|
//! | `snr < snr_min` or `rssi < rssi_min` | failsafe on |
//! | `snr > snr_max` and `rssi > rssi_max` | failsafe off |
//! | anything else | unchanged |

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

/// Radio status datagram size: RSSI(1) + noise(1)
pub const RADIO_STATUS_LEN: usize = 2;

/// Filter and hysteresis settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkThresholds {
    /// Smoothing factor α in (0, 1]
    pub filter: f64,
    pub snr_min: i32,
    pub snr_max: i32,
    pub rssi_min: i32,
    pub rssi_max: i32,
}

impl Default for LinkThresholds {
    fn default() -> Self {
        Self {
            filter: 0.25,
            snr_min: -10,
            snr_max: -5,
            rssi_min: -130,
            rssi_max: -125,
        }
    }
}

/// Filtered link state
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinkState {
    /// Filtered RSSI, `None` until the first report
    pub rssi: Option<f64>,
    /// Filtered SNR, `None` until the first report
    pub snr: Option<f64>,
    /// Whether transmission is currently suppressed
    pub failsafe_active: bool,
}

/// Result of one observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkReport {
    /// Unfiltered RSSI of this sample
    pub sample_rssi: i32,
    /// Unfiltered SNR of this sample
    pub sample_snr: i32,
    /// Filtered RSSI after this sample
    pub rssi: f64,
    /// Filtered SNR after this sample
    pub snr: f64,
    pub failsafe_active: bool,
    /// Whether this sample flipped the failsafe state
    pub changed: bool,
}

/// One radio status report as received on the status socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioStatus {
    /// RSSI magnitude
    pub rssi: u8,
    /// Noise floor magnitude
    pub noise: u8,
}

impl RadioStatus {
    /// Parse a status datagram, `None` unless it is exactly 2 bytes
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match bytes {
            &[rssi, noise] => Some(Self { rssi, noise }),
            _ => None,
        }
    }
}

/// Link quality monitor shared between the status receiver and the scheduler
#[derive(Debug)]
pub struct LinkQualityMonitor {
    thresholds: LinkThresholds,
    state: Mutex<LinkState>,
}

impl LinkQualityMonitor {
    /// Creates a monitor with no history and failsafe off
    pub fn new(thresholds: LinkThresholds) -> Self {
        Self {
            thresholds,
            state: Mutex::new(LinkState::default()),
        }
    }

    /// Configured thresholds
    pub fn thresholds(&self) -> &LinkThresholds {
        &self.thresholds
    }

    /// Feed one raw sample
    ///
    /// Never fails: a single bad sample is absorbed by the filter.
    pub fn observe(&self, rssi_raw: i32, noise_raw: i32) -> LinkReport {
        let t = &self.thresholds;
        let sample_rssi = rssi_raw.saturating_neg();
        let sample_noise = noise_raw.saturating_neg();
        let sample_snr = sample_rssi.saturating_sub(sample_noise);

        let mut state = self.lock();

        let rssi = smooth(state.rssi, sample_rssi, t.filter);
        let snr = smooth(state.snr, sample_snr, t.filter);
        state.rssi = Some(rssi);
        state.snr = Some(snr);

        let was_active = state.failsafe_active;
        if snr < f64::from(t.snr_min) || rssi < f64::from(t.rssi_min) {
            state.failsafe_active = true;
        } else if snr > f64::from(t.snr_max) && rssi > f64::from(t.rssi_max) {
            state.failsafe_active = false;
        }

        let report = LinkReport {
            sample_rssi,
            sample_snr,
            rssi,
            snr,
            failsafe_active: state.failsafe_active,
            changed: was_active != state.failsafe_active,
        };
        drop(state);

        debug!(
            "Radio status rssi={} (filtered {:.1}), snr={} (filtered {:.1}), failsafe={}",
            sample_rssi, rssi, sample_snr, snr, report.failsafe_active
        );

        if report.changed {
            if report.failsafe_active {
                warn!("Link degraded (rssi {:.1}, snr {:.1}): failsafe engaged", rssi, snr);
            } else {
                info!("Link recovered (rssi {:.1}, snr {:.1}): failsafe released", rssi, snr);
            }
        }

        report
    }

    /// Feed a parsed status datagram
    pub fn observe_status(&self, status: RadioStatus) -> LinkReport {
        self.observe(i32::from(status.rssi), i32::from(status.noise))
    }

    /// Whether transmission should be suppressed
    pub fn failsafe_active(&self) -> bool {
        self.lock().failsafe_active
    }

    /// Copy of the current state
    pub fn state(&self) -> LinkState {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn smooth(previous: Option<f64>, sample: i32, alpha: f64) -> f64 {
    let sample = f64::from(sample);
    match previous {
        Some(prev) => prev * (1.0 - alpha) + sample * alpha,
        None => sample,
    }
}
