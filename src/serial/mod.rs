//! # Serial Communication Module
//!
//! Opens the serial ports used on both ends of the link.
//!
//! This module handles:
//! - SBUS ports: 100,000 baud, 8 data bits, even parity, 2 stop bits
//! - Handheld controller tty ports: 8N1 at the configured rate
//! - Writing complete SBUS frames to an output port

use crate::error::{RcBridgeError, Result};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

pub mod port_trait;

/// Serial line settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub parity: tokio_serial::Parity,
    pub stop_bits: tokio_serial::StopBits,
}

impl LineSettings {
    /// SBUS line settings (8E2) at the given rate
    pub fn sbus(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            parity: tokio_serial::Parity::Even,
            stop_bits: tokio_serial::StopBits::Two,
        }
    }

    /// Plain 8N1 settings
    pub fn tty(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            parity: tokio_serial::Parity::None,
            stop_bits: tokio_serial::StopBits::One,
        }
    }
}

/// Open a serial port with the given line settings
///
/// # Errors
///
/// Returns `RcBridgeError::SerialPortNotFound` if the device does not exist,
/// `RcBridgeError::Serial` if it cannot be opened or configured. Callers
/// treat both as fatal at startup.
pub fn open_port(path: &str, settings: LineSettings) -> Result<tokio_serial::SerialStream> {
    debug!("Opening serial port {} ({:?})", path, settings);

    let port = tokio_serial::new(path, settings.baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(settings.parity)
        .stop_bits(settings.stop_bits)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| open_error(path, e))?;

    Ok(port)
}

/// Classify a failed open, separating a missing device from other failures
fn open_error(path: &str, error: tokio_serial::Error) -> RcBridgeError {
    match error.kind {
        tokio_serial::ErrorKind::NoDevice
        | tokio_serial::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
            RcBridgeError::SerialPortNotFound(path.to_string())
        }
        _ => RcBridgeError::Serial(format!("Failed to open {}: {}", path, error)),
    }
}

/// SBUS output port
///
/// Writes complete 25-byte frames to a servo bus or flight controller.
pub struct SbusSerial {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/ttyS1)
    device_path: String,
}

impl std::fmt::Debug for SbusSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SbusSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SbusSerial {
    /// Open an SBUS output port
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyS1")
    /// * `baud_rate` - Line rate, normally 100,000
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = open_port(path, LineSettings::sbus(baud_rate))?;
        info!("Opened SBUS output at {}", path);

        Ok(Self {
            port,
            device_path: path.to_string(),
        })
    }

    /// Write one frame and flush it out of the driver
    pub async fn send_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;

        self.port.write_all(frame).await?;
        self.port.flush().await?;

        debug!("Sent SBUS frame ({} bytes) to {}", frame.len(), self.device_path);
        Ok(())
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sbus_line_settings() {
        let settings = LineSettings::sbus(100_000);
        assert_eq!(settings.baud_rate, 100_000);
        assert_eq!(settings.parity, tokio_serial::Parity::Even);
        assert_eq!(settings.stop_bits, tokio_serial::StopBits::Two);
    }

    #[test]
    fn test_tty_line_settings() {
        let settings = LineSettings::tty(115_200);
        assert_eq!(settings.parity, tokio_serial::Parity::None);
        assert_eq!(settings.stop_bits, tokio_serial::StopBits::One);
    }

    #[tokio::test]
    async fn test_open_port_with_invalid_path_returns_error() {
        let result = open_port("/dev/nonexistent_serial_device_12345", LineSettings::tty(115_200));

        match result {
            Err(RcBridgeError::SerialPortNotFound(path)) => {
                assert_eq!(path, "/dev/nonexistent_serial_device_12345");
            }
            Err(RcBridgeError::Serial(msg)) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected serial open error, got: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_device_is_not_found() {
        let error = tokio_serial::Error::new(tokio_serial::ErrorKind::NoDevice, "no such device");
        assert!(matches!(
            open_error("/dev/ttyS9", error),
            RcBridgeError::SerialPortNotFound(path) if path == "/dev/ttyS9"
        ));

        let error = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::NotFound),
            "No such file or directory",
        );
        assert!(matches!(
            open_error("/dev/ttyUSB3", error),
            RcBridgeError::SerialPortNotFound(_)
        ));
    }

    #[test]
    fn test_other_open_failures_are_serial_errors() {
        let error = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
            "Permission denied",
        );
        match open_error("/dev/ttyS1", error) {
            RcBridgeError::Serial(msg) => {
                assert!(msg.contains("/dev/ttyS1"));
                assert!(msg.contains("Permission denied"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sbus_open_invalid_path() {
        assert!(SbusSerial::open("/dev/nonexistent_sbus_port", 100_000).is_err());
    }

    // Integration test - only runs with a loopback or real SBUS device attached
    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_send_frame_with_real_hardware() {
        use crate::sbus::encoder::encode;

        if let Ok(mut serial) = SbusSerial::open("/dev/ttyS1", 100_000) {
            let frame = encode(&[1024; 16]);
            let result = serial.send_frame(&frame).await;
            assert!(result.is_ok(), "Failed to send frame: {:?}", result);
        } else {
            println!("No SBUS hardware detected (skipping send test)");
        }
    }
}
