//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{RcBridgeError, Result};
use crate::link::LinkThresholds;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub sbus: SbusConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub ground: GroundConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Which end of the link this process runs
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Receives frames over UDP and drives SBUS outputs
    Air,
    /// Collects input and sends frames over UDP
    Ground,
}

/// Service role configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub role: Role,
}

/// Radio status filtering and failsafe thresholds
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default = "default_filter")]
    pub filter: f64,

    #[serde(default = "default_snr_hys_min")]
    pub snr_hys_min: i32,

    #[serde(default = "default_snr_hys_max")]
    pub snr_hys_max: i32,

    #[serde(default = "default_rssi_hys_min")]
    pub rssi_hys_min: i32,

    #[serde(default = "default_rssi_hys_max")]
    pub rssi_hys_max: i32,

    /// Unix datagram socket the radio reports link status on ("" disables)
    #[serde(default)]
    pub status_socket: String,
}

/// Output rate of the air unit
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    /// 70 frames per second
    Low,
    /// 140 frames per second
    High,
}

/// SBUS bus configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SbusConfig {
    #[serde(default = "default_speed")]
    pub speed: Speed,

    #[serde(default = "default_bus_count")]
    pub bus_count: usize,

    #[serde(default)]
    pub sbus1_port: String,

    #[serde(default)]
    pub sbus2_port: String,

    #[serde(default = "default_sbus_baud_rate")]
    pub baud_rate: u32,
}

/// UDP link between ground and air units
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_rc_udp_port")]
    pub rc_udp_port: u16,

    #[serde(default = "default_air_address")]
    pub air_address: String,
}

/// Where the ground unit takes its channel values from
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    /// SBUS frames read from the configured serial ports
    Sbus,
    /// PPM pulse widths polled from sysfs
    Ppm,
    /// Channel packets from a handheld controller on a tty
    Tty,
}

/// Ground unit configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GroundConfig {
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: u32,

    #[serde(default = "default_input")]
    pub input: InputSource,

    #[serde(default = "default_ppm_paths")]
    pub ppm_paths: Vec<String>,

    #[serde(default = "default_ppm_poll_hz")]
    pub ppm_poll_hz: u32,

    #[serde(default)]
    pub tty_port: String,

    #[serde(default = "default_tty_baud_rate")]
    pub tty_baud_rate: u32,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files ("" logs to stderr only)
    #[serde(default)]
    pub log_dir: String,
}

/// Link telemetry recording
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_telemetry_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

// Default value functions
fn default_filter() -> f64 { 0.25 }
fn default_snr_hys_min() -> i32 { -10 }
fn default_snr_hys_max() -> i32 { -5 }
fn default_rssi_hys_min() -> i32 { -130 }
fn default_rssi_hys_max() -> i32 { -125 }

fn default_speed() -> Speed { Speed::Low }
fn default_bus_count() -> usize { 2 }
fn default_sbus_baud_rate() -> u32 { 100_000 }

fn default_rc_udp_port() -> u16 { 16666 }
fn default_air_address() -> String { "192.168.0.10".to_string() }

fn default_frequency_hz() -> u32 { 25 }
fn default_input() -> InputSource { InputSource::Sbus }
fn default_ppm_paths() -> Vec<String> {
    vec![
        "/sys/bus/i2c/drivers/rc-io/5-0035/rcio_ppm0".to_string(),
        "/sys/bus/i2c/drivers/rc-io/5-0035/rcio_ppm1".to_string(),
    ]
}
fn default_ppm_poll_hz() -> u32 { 50 }
fn default_tty_baud_rate() -> u32 { 115_200 }

fn default_log_level() -> String { "info".to_string() }

fn default_telemetry_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            snr_hys_min: default_snr_hys_min(),
            snr_hys_max: default_snr_hys_max(),
            rssi_hys_min: default_rssi_hys_min(),
            rssi_hys_max: default_rssi_hys_max(),
            status_socket: String::new(),
        }
    }
}

impl Default for SbusConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            bus_count: default_bus_count(),
            sbus1_port: String::new(),
            sbus2_port: String::new(),
            baud_rate: default_sbus_baud_rate(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            rc_udp_port: default_rc_udp_port(),
            air_address: default_air_address(),
        }
    }
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            frequency_hz: default_frequency_hz(),
            input: default_input(),
            ppm_paths: default_ppm_paths(),
            ppm_poll_hz: default_ppm_poll_hz(),
            tty_port: String::new(),
            tty_baud_rate: default_tty_baud_rate(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_telemetry_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl RadioConfig {
    /// Filter and hysteresis settings for the link monitor
    pub fn thresholds(&self) -> LinkThresholds {
        LinkThresholds {
            filter: self.filter,
            snr_min: self.snr_hys_min,
            snr_max: self.snr_hys_max,
            rssi_min: self.rssi_hys_min,
            rssi_max: self.rssi_hys_max,
        }
    }
}

impl SbusConfig {
    /// Air unit frame period for the configured speed
    pub fn period(&self) -> Duration {
        match self.speed {
            Speed::Low => Duration::from_nanos(1_000_000_000 / 70),
            Speed::High => Duration::from_nanos(1_000_000_000 / 140),
        }
    }

    /// Serial port of a 1-indexed bus, `None` when unset
    pub fn port(&self, bus: usize) -> Option<&str> {
        let port = match bus {
            1 => &self.sbus1_port,
            2 => &self.sbus2_port,
            _ => return None,
        };
        (!port.is_empty()).then_some(port.as_str())
    }
}

impl GroundConfig {
    /// Ground unit frame period
    pub fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.frequency_hz.max(1)))
    }

    /// PPM polling period
    pub fn ppm_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.ppm_poll_hz.max(1)))
    }
}

fn invalid(msg: impl std::fmt::Display) -> RcBridgeError {
    RcBridgeError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rc_bridge::config::Config;
    ///
    /// let config = Config::load("config/air.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range or a
    /// port required by the selected role is missing
    fn validate(&self) -> Result<()> {
        // Validate radio filter
        if !(self.radio.filter > 0.0 && self.radio.filter <= 1.0) {
            return Err(invalid("filter must be greater than 0.0 and at most 1.0"));
        }

        if self.radio.snr_hys_min > self.radio.snr_hys_max {
            return Err(invalid("snr_hys_min must not exceed snr_hys_max"));
        }

        if self.radio.rssi_hys_min > self.radio.rssi_hys_max {
            return Err(invalid("rssi_hys_min must not exceed rssi_hys_max"));
        }

        // Validate bus count
        if !(1..=2).contains(&self.sbus.bus_count) {
            return Err(invalid("bus_count must be 1 or 2"));
        }

        if self.sbus.baud_rate == 0 {
            return Err(invalid("baud_rate must be greater than 0"));
        }

        if self.link.rc_udp_port == 0 {
            return Err(invalid("rc_udp_port must be greater than 0"));
        }

        match self.service.role {
            Role::Air => {
                if (1..=self.sbus.bus_count).all(|bus| self.sbus.port(bus).is_none()) {
                    return Err(invalid("air role needs at least one of sbus1_port, sbus2_port"));
                }
            }
            Role::Ground => self.validate_ground()?,
        }

        // Validate telemetry
        if self.telemetry.enabled {
            if self.telemetry.log_dir.is_empty() {
                return Err(invalid("telemetry log_dir cannot be empty when enabled"));
            }
            if self.telemetry.max_records_per_file == 0 {
                return Err(invalid("max_records_per_file must be greater than 0"));
            }
            if self.telemetry.max_files_to_keep == 0 {
                return Err(invalid("max_files_to_keep must be greater than 0"));
            }
        }

        Ok(())
    }

    fn validate_ground(&self) -> Result<()> {
        let ground = &self.ground;

        if ground.frequency_hz == 0 || ground.frequency_hz > 500 {
            return Err(invalid("frequency_hz must be between 1 and 500"));
        }

        if self.link.air_address.is_empty() {
            return Err(invalid("air_address cannot be empty for the ground role"));
        }

        match ground.input {
            InputSource::Sbus => {
                if (1..=self.sbus.bus_count).all(|bus| self.sbus.port(bus).is_none()) {
                    return Err(invalid("sbus input needs at least one of sbus1_port, sbus2_port"));
                }
            }
            InputSource::Ppm => {
                if ground.ppm_paths.is_empty() || ground.ppm_paths.len() > 2 {
                    return Err(invalid("ppm_paths must list 1 or 2 files"));
                }
                if ground.ppm_poll_hz == 0 || ground.ppm_poll_hz > 500 {
                    return Err(invalid("ppm_poll_hz must be between 1 and 500"));
                }
            }
            InputSource::Tty => {
                if ground.tty_port.is_empty() {
                    return Err(invalid("tty input needs tty_port"));
                }
            }
        }

        Ok(())
    }
}
