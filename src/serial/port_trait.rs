//! Trait abstraction for frame outputs so the scheduler can be tested without hardware

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

use super::SbusSerial;
use crate::error::{RcBridgeError, Result};

/// Destination for encoded frames
#[async_trait]
pub trait FrameSink: Send {
    /// Send one complete frame or envelope. A partial write is an error.
    async fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Human readable destination for logs
    fn describe(&self) -> String;
}

#[async_trait]
impl FrameSink for SbusSerial {
    async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.send_frame(bytes).await
    }

    fn describe(&self) -> String {
        self.device_path().to_string()
    }
}

/// UDP datagram output towards the air unit
#[derive(Debug)]
pub struct UdpSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpSink {
    /// Bind an ephemeral local port and connect it to `target`
    ///
    /// # Errors
    ///
    /// Returns `RcBridgeError::Transport` if the socket cannot be bound or connected
    pub async fn connect(target: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| RcBridgeError::Transport(format!("Failed to bind UDP socket: {}", e)))?;
        socket
            .connect(target)
            .await
            .map_err(|e| RcBridgeError::Transport(format!("Failed to connect to {}: {}", target, e)))?;

        Ok(Self { socket, target })
    }
}

#[async_trait]
impl FrameSink for UdpSink {
    async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let sent = self.socket.send(bytes).await?;
        if sent != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("partial datagram: {} of {} bytes", sent, bytes.len()),
            ));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("udp://{}", self.target)
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock sink for testing
    #[derive(Clone, Default)]
    pub struct MockFrameSink {
        pub written_data: Arc<Mutex<Vec<Vec<u8>>>>,
        pub write_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub delay: Option<Duration>,
    }

    impl MockFrameSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// A sink whose every send takes `delay`
        pub fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn get_written_data(&self) -> Vec<Vec<u8>> {
            self.written_data.lock().unwrap().clone()
        }

        pub fn set_write_error(&self, error: io::ErrorKind) {
            *self.write_error.lock().unwrap() = Some(error);
        }
    }

    #[async_trait]
    impl FrameSink for MockFrameSink {
        async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(error) = *self.write_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock write error"));
            }
            self.written_data.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }

        fn describe(&self) -> String {
            "mock".to_string()
        }
    }
}
