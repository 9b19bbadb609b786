//! # Air Service
//!
//! Receives channel frames from the ground unit and drives the SBUS outputs.
//!
//! Tasks:
//! - frame receiver: UDP envelopes → channel table
//! - radio status receiver: unix datagrams → link monitor (and telemetry)
//! - transmit scheduler: channel table → SBUS serial ports, 70 or 140 Hz,
//!   suppressed while failsafe is engaged

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::{UdpSocket, UnixDatagram};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use super::{Service, Supervisor};
use crate::channels::ChannelTable;
use crate::config::{Config, Role};
use crate::error::{RcBridgeError, Result};
use crate::link::{LinkQualityMonitor, RadioStatus, RADIO_STATUS_LEN};
use crate::sbus::decoder::{decode, format_channels};
use crate::sbus::envelope::RcMessage;
use crate::sbus::protocol::{FrameError, ENVELOPE_LEN};
use crate::scheduler::{BusOutput, FrameEncoding, TransmitScheduler};
use crate::serial::SbusSerial;
use crate::telemetry::{LinkRecord, TelemetryLogger};

/// Received frames between channel dumps at debug level
const DEBUG_DUMP_INTERVAL: u64 = 70;

pub(super) async fn start(config: &Config) -> Result<Service> {
    let table = Arc::new(ChannelTable::new());
    let monitor = Arc::new(LinkQualityMonitor::new(config.radio.thresholds()));

    // Acquire everything before spawning so a failure leaves nothing running
    let mut scheduler = TransmitScheduler::new(config.sbus.period(), Arc::clone(&table))
        .with_failsafe(Arc::clone(&monitor));
    for bus in 1..=config.sbus.bus_count {
        match config.sbus.port(bus) {
            Some(port) => {
                let serial = SbusSerial::open(port, config.sbus.baud_rate)?;
                scheduler = scheduler.with_output(BusOutput::new(bus, FrameEncoding::Raw, Box::new(serial)));
            }
            None => info!("SBUS{} has no port configured, not driven", bus),
        }
    }

    let bind_addr = SocketAddr::from(([0, 0, 0, 0], config.link.rc_udp_port));
    let frames = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| RcBridgeError::Transport(format!("Failed to bind {}: {}", bind_addr, e)))?;
    let local_addr = frames.local_addr()?;
    info!("Listening for frames on {}", local_addr);

    let status = if config.radio.status_socket.is_empty() {
        warn!("No radio status socket configured, failsafe will never engage");
        None
    } else {
        Some(bind_status_socket(&config.radio.status_socket)?)
    };

    let recorder = if config.telemetry.enabled {
        Some(TelemetryLogger::new(&config.telemetry)?)
    } else {
        None
    };

    let mut supervisor = Supervisor::new();
    let stats = supervisor.spawn_scheduler(scheduler);

    let frame_table = Arc::clone(&table);
    supervisor.spawn("frame receiver", move |shutdown| {
        receive_frames(frames, frame_table, shutdown)
    });

    if let Some(socket) = status {
        let status_monitor = Arc::clone(&monitor);
        supervisor.spawn("radio status receiver", move |shutdown| {
            receive_radio_status(socket, status_monitor, recorder, shutdown)
        });
    }

    Ok(Service {
        role: Role::Air,
        table,
        monitor: Some(monitor),
        stats,
        local_addr: Some(local_addr),
        supervisor,
    })
}

/// Bind the radio status socket, replacing a stale socket file
pub fn bind_status_socket(path: &str) -> Result<UnixDatagram> {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed stale socket {}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(RcBridgeError::Transport(format!(
                "Failed to remove stale socket {}: {}",
                path, e
            )))
        }
    }

    let socket = UnixDatagram::bind(Path::new(path))
        .map_err(|e| RcBridgeError::Transport(format!("Failed to bind {}: {}", path, e)))?;
    info!("Listening for radio status on {}", path);
    Ok(socket)
}

/// Decode one envelope into the channel table
///
/// Returns the 1-indexed bus that was updated.
pub fn apply_envelope(bytes: &[u8], table: &ChannelTable) -> std::result::Result<usize, FrameError> {
    let message = RcMessage::parse(bytes)?;
    let channels = decode(&message.frame)?;
    let bus = usize::from(message.bus) + 1;

    table.set_bus(bus, &channels);
    Ok(bus)
}

/// Receive envelopes until shutdown
pub async fn receive_frames(
    socket: UdpSocket,
    table: Arc<ChannelTable>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    // one spare byte so oversized datagrams are detected
    let mut buf = [0u8; ENVELOPE_LEN + 1];
    let mut received: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            result = socket.recv_from(&mut buf) => {
                let (len, from) = match result {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Frame receive failed: {}", e);
                        continue;
                    }
                };

                match apply_envelope(&buf[..len], &table) {
                    Ok(bus) => {
                        received += 1;
                        if received % DEBUG_DUMP_INTERVAL == 0 {
                            if let Some(channels) = table.snapshot(bus) {
                                debug!("SBUS{} [{}]", bus, format_channels(&channels));
                            }
                        }
                    }
                    Err(e) => trace!("Ignoring datagram from {}: {}", from, e),
                }
            }
        }
    }

    info!("Frame receiver stopped after {} frames", received);
    Ok(())
}

/// Feed radio status datagrams to the link monitor until shutdown
pub async fn receive_radio_status(
    socket: UnixDatagram,
    monitor: Arc<LinkQualityMonitor>,
    mut recorder: Option<TelemetryLogger>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut buf = [0u8; RADIO_STATUS_LEN + 1];

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            result = socket.recv(&mut buf) => {
                let len = match result {
                    Ok(len) => len,
                    Err(e) => {
                        warn!("Radio status receive failed: {}", e);
                        continue;
                    }
                };

                let Some(status) = RadioStatus::parse(&buf[..len]) else {
                    trace!("Ignoring {} byte radio status datagram", len);
                    continue;
                };

                let report = monitor.observe_status(status);
                if let Some(recorder) = recorder.as_mut() {
                    recorder.record(&LinkRecord::now(&report));
                }
            }
        }
    }

    if let Some(recorder) = recorder.as_mut() {
        recorder.flush();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;
    use crate::link::LinkThresholds;
    use crate::sbus::encoder::encode;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_apply_envelope_updates_bus() {
        let table = ChannelTable::new();
        let bytes = RcMessage::new(1, encode(&[1500; 16])).to_bytes();

        assert_eq!(apply_envelope(&bytes, &table), Ok(2));
        assert_eq!(table.snapshot(2), Some([1500; 16]));
        assert_eq!(table.snapshot(1), Some([0; 16]));
    }

    #[test]
    fn test_apply_envelope_rejects_bad_input() {
        let table = ChannelTable::filled(700);

        let mut bytes = RcMessage::new(0, encode(&[1500; 16])).to_bytes();
        bytes[0] = 0x10;
        assert!(apply_envelope(&bytes, &table).is_err());
        assert!(apply_envelope(&bytes[..20], &table).is_err());

        assert_eq!(table.snapshot(1), Some([700; 16]));
    }

    #[tokio::test]
    async fn test_receive_frames_over_udp() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let table = Arc::new(ChannelTable::new());
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(receive_frames(socket, Arc::clone(&table), stop_rx));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"garbage", addr).await.unwrap();
        let bytes = RcMessage::new(0, encode(&[321; 16])).to_bytes();
        sender.send_to(&bytes, addr).await.unwrap();

        wait_until(|| table.get(1, 16) == Some(321)).await;

        stop_tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_status_socket_replaces_stale_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("radio.sock");
        std::fs::write(&path, b"stale").unwrap();

        let socket = bind_status_socket(path.to_str().unwrap());
        assert!(socket.is_ok());
    }

    #[tokio::test]
    async fn test_radio_status_drives_failsafe_and_telemetry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("radio.sock");
        let socket = bind_status_socket(path.to_str().unwrap()).unwrap();

        let telemetry = TelemetryConfig {
            enabled: true,
            log_dir: dir.path().join("telemetry").to_string_lossy().into_owned(),
            max_records_per_file: 100,
            max_files_to_keep: 2,
        };
        let recorder = TelemetryLogger::new(&telemetry).unwrap();

        let monitor = Arc::new(LinkQualityMonitor::new(LinkThresholds::default()));
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(receive_radio_status(
            socket,
            Arc::clone(&monitor),
            Some(recorder),
            stop_rx,
        ));

        let client = UnixDatagram::unbound().unwrap();
        client.send_to(&[1, 2, 3], &path).await.unwrap();
        client.send_to(&[135, 5], &path).await.unwrap();

        wait_until(|| monitor.failsafe_active()).await;

        stop_tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());

        let files: Vec<_> = std::fs::read_dir(dir.path().join("telemetry"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);

        let contents = std::fs::read_to_string(&files[0]).unwrap();
        let value: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(value["sample_rssi"], -135);
        assert_eq!(value["failsafe_active"], true);
    }
}
