//! # Ground Service
//!
//! Collects channel values from one input source and sends them to the air
//! unit as UDP envelopes at `frequency_hz`.
//!
//! Input producers:
//! - `sbus`: SBUS serial stream per bus, resynchronized with [`FrameSync`]
//! - `ppm`: pulse widths polled from sysfs, one file per bus, channels 1..=8
//! - `tty`: channel packets from a handheld controller, bus 1

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::{Service, Supervisor};
use crate::channels::ChannelTable;
use crate::config::{Config, InputSource, Role};
use crate::error::{RcBridgeError, Result};
use crate::ppm::{parse_ppm_values, ppm_to_sbus};
use crate::sbus::decoder::decode;
use crate::sbus::sync::FrameSync;
use crate::scheduler::{BusOutput, FrameEncoding, TransmitScheduler};
use crate::serial::port_trait::UdpSink;
use crate::serial::{open_port, LineSettings};
use crate::tty::TtyParser;

const READ_BUFFER_SIZE: usize = 256;

/// Pause after a failed serial read before trying again
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bus fed by the handheld controller
const TTY_BUS: usize = 1;

pub(super) async fn start(config: &Config) -> Result<Service> {
    let table = Arc::new(ChannelTable::new());
    let target = resolve_air_address(&config.link.air_address, config.link.rc_udp_port).await?;
    info!("Sending frames to {} at {} Hz", target, config.ground.frequency_hz);

    let mut scheduler = TransmitScheduler::new(config.ground.period(), Arc::clone(&table));
    for bus in 1..=config.sbus.bus_count {
        let sink = UdpSink::connect(target).await?;
        scheduler = scheduler.with_output(BusOutput::new(bus, FrameEncoding::Envelope, Box::new(sink)));
    }

    let mut supervisor = Supervisor::new();

    match config.ground.input {
        InputSource::Sbus => {
            let mut readers = Vec::new();
            for bus in 1..=config.sbus.bus_count {
                if let Some(port) = config.sbus.port(bus) {
                    let stream = open_port(port, LineSettings::sbus(config.sbus.baud_rate))?;
                    info!("Reading SBUS{} from {}", bus, port);
                    readers.push((bus, stream));
                }
            }
            for (bus, stream) in readers {
                let table = Arc::clone(&table);
                supervisor.spawn(format!("SBUS{} reader", bus), move |shutdown| {
                    read_sbus(stream, bus, table, shutdown)
                });
            }
        }
        InputSource::Ppm => {
            let period = config.ground.ppm_period();
            for (index, path) in config.ground.ppm_paths.iter().take(config.sbus.bus_count).enumerate() {
                let bus = index + 1;
                let path = PathBuf::from(path);
                let table = Arc::clone(&table);
                info!("Polling PPM{} from {}", bus, path.display());
                supervisor.spawn(format!("PPM{} poller", bus), move |shutdown| {
                    poll_ppm(path, bus, period, table, shutdown)
                });
            }
        }
        InputSource::Tty => {
            let port = &config.ground.tty_port;
            let stream = open_port(port, LineSettings::tty(config.ground.tty_baud_rate))?;
            info!("Reading handheld controller from {}", port);
            let table = Arc::clone(&table);
            supervisor.spawn("tty reader", move |shutdown| read_tty(stream, table, shutdown));
        }
    }

    let stats = supervisor.spawn_scheduler(scheduler);

    Ok(Service {
        role: Role::Ground,
        table,
        monitor: None,
        stats,
        local_addr: None,
        supervisor,
    })
}

async fn resolve_air_address(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| RcBridgeError::Transport(format!("Failed to resolve {}: {}", host, e)))?;

    addrs
        .next()
        .ok_or_else(|| RcBridgeError::Transport(format!("No address found for {}", host)))
}

/// Next chunk from `reader`, `None` on shutdown or end of input
///
/// Read errors are logged and retried after [`READ_ERROR_BACKOFF`].
async fn next_chunk<R>(
    reader: &mut R,
    buf: &mut [u8],
    shutdown: &mut watch::Receiver<bool>,
    name: &str,
) -> Option<usize>
where
    R: AsyncRead + Unpin,
{
    loop {
        let result = tokio::select! {
            _ = shutdown.changed() => return None,
            result = reader.read(&mut *buf) => result,
        };

        match result {
            Ok(0) => {
                warn!("{} input closed", name);
                return None;
            }
            Ok(n) => return Some(n),
            Err(e) => {
                warn!("{} read failed: {}", name, e);
                tokio::select! {
                    _ = shutdown.changed() => return None,
                    _ = tokio::time::sleep(READ_ERROR_BACKOFF) => {}
                }
            }
        }
    }
}

/// Read an SBUS byte stream into one bus of the table until shutdown or EOF
pub async fn read_sbus<R>(
    mut reader: R,
    bus: usize,
    table: Arc<ChannelTable>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut sync = FrameSync::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let name = format!("SBUS{}", bus);

    while let Some(n) = next_chunk(&mut reader, &mut buf, &mut shutdown, &name).await {
        for frame in sync.push(&buf[..n]) {
            match decode(&frame) {
                Ok(channels) => table.set_bus(bus, &channels),
                Err(e) => trace!("SBUS{} frame rejected: {}", bus, e),
            }
        }
    }

    info!(
        "SBUS{} reader stopped: {} frames, {} bytes discarded",
        bus,
        sync.frames(),
        sync.dropped_bytes()
    );
    Ok(())
}

/// Poll a PPM sysfs file into channels 1..=8 of one bus until shutdown
pub async fn poll_ppm(
    path: PathBuf,
    bus: usize,
    period: Duration,
    table: Arc<ChannelTable>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failing = false;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                if failing {
                    info!("PPM{} readable again", bus);
                    failing = false;
                }
                for (index, ppm) in parse_ppm_values(&text).into_iter().enumerate() {
                    table.set(bus, index + 1, i32::from(ppm_to_sbus(ppm)));
                }
            }
            // a missing source is reported once, not on every poll
            Err(e) if !failing => {
                warn!("Failed to read PPM{} from {}: {}", bus, path.display(), e);
                failing = true;
            }
            Err(_) => {}
        }
    }

    Ok(())
}

/// Read handheld controller packets into bus 1 until shutdown or EOF
pub async fn read_tty<R>(
    mut reader: R,
    table: Arc<ChannelTable>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut parser = TtyParser::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    while let Some(n) = next_chunk(&mut reader, &mut buf, &mut shutdown, "Handheld controller").await {
        for packet in parser.push(&buf[..n]) {
            match packet.channels() {
                Some(channels) => table.set_bus(TTY_BUS, &channels),
                None => debug!("Ignoring tty function 0x{:02X}", packet.function),
            }
        }
    }

    info!(
        "tty reader stopped ({} checksum errors)",
        parser.checksum_errors()
    );
    Ok(())
}
