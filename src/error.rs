//! # Error Types
//!
//! Custom error types for RC Bridge using `thiserror`.

use thiserror::Error;

use crate::sbus::protocol::FrameError;

/// Main error type for RC Bridge
#[derive(Debug, Error)]
pub enum RcBridgeError {
    /// SBUS framing errors
    #[error("SBUS frame error: {0}")]
    Frame(#[from] FrameError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be configured or used
    #[error("Serial error: {0}")]
    Serial(String),

    /// Configured serial device does not exist
    #[error("Serial port not found: {0}")]
    SerialPortNotFound(String),

    /// Socket setup failures (bind, connect)
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for RC Bridge
pub type Result<T> = std::result::Result<T, RcBridgeError>;
