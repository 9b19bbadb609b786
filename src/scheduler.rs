//! # Transmit Scheduler
//!
//! Sends the current channel values of each configured bus at a fixed rate.
//!
//! On every tick the scheduler:
//! 1. skips the tick when a failsafe monitor is attached and engaged,
//! 2. snapshots each bus from the [`ChannelTable`],
//! 3. encodes the snapshot (raw SBUS frame or UDP envelope),
//! 4. hands the bytes to that output's writer task without waiting.
//!
//! Each output owns a writer task fed through a one-slot channel. While a
//! write is still in flight, newer frames for that output are dropped, so a
//! slow transport never delays the ticker. Write errors are logged and the
//! next tick proceeds normally.
//!
//! Shutdown stops the ticker first, lets the writers drain what they already
//! hold, and only then drops the transports.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::channels::ChannelTable;
use crate::link::LinkQualityMonitor;
use crate::sbus::encoder::encode;
use crate::sbus::envelope::RcMessage;
use crate::serial::port_trait::FrameSink;

/// Number of ticks between status log messages
const LOG_INTERVAL_TICKS: u64 = 1000;

/// How frames are put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoding {
    /// Bare 25-byte SBUS frame (serial outputs)
    Raw,
    /// 26-byte envelope carrying the bus index (UDP link)
    Envelope,
}

/// One bus bound to one transport
pub struct BusOutput {
    /// 1-indexed bus read from the channel table
    pub bus: usize,
    pub encoding: FrameEncoding,
    pub sink: Box<dyn FrameSink>,
}

impl BusOutput {
    pub fn new(bus: usize, encoding: FrameEncoding, sink: Box<dyn FrameSink>) -> Self {
        Self { bus, encoding, sink }
    }
}

impl std::fmt::Debug for BusOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusOutput")
            .field("bus", &self.bus)
            .field("encoding", &self.encoding)
            .field("sink", &self.sink.describe())
            .finish()
    }
}

/// Live counters shared with whoever wants to watch the scheduler
#[derive(Debug, Default)]
pub struct TransmitStats {
    ticks: AtomicU64,
    sent: AtomicU64,
    suppressed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`TransmitStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransmitCounts {
    /// Timer ticks handled
    pub ticks: u64,
    /// Frames written successfully
    pub sent: u64,
    /// Ticks skipped because of failsafe
    pub suppressed: u64,
    /// Frames discarded because the previous write was still in flight
    pub dropped: u64,
    /// Frames whose write failed
    pub failed: u64,
}

impl TransmitStats {
    pub fn counts(&self) -> TransmitCounts {
        TransmitCounts {
            ticks: self.ticks.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Snapshot a bus and encode it, `None` for an invalid bus
pub fn build_frame(table: &ChannelTable, bus: usize, encoding: FrameEncoding) -> Option<Vec<u8>> {
    let channels = table.snapshot(bus)?;
    let frame = encode(&channels);

    Some(match encoding {
        FrameEncoding::Raw => frame.to_vec(),
        FrameEncoding::Envelope => RcMessage::new((bus - 1) as u8, frame).to_bytes().to_vec(),
    })
}

/// Fixed-rate frame transmitter
pub struct TransmitScheduler {
    period: Duration,
    table: Arc<ChannelTable>,
    monitor: Option<Arc<LinkQualityMonitor>>,
    outputs: Vec<BusOutput>,
    stats: Arc<TransmitStats>,
}

impl std::fmt::Debug for TransmitScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmitScheduler")
            .field("period", &self.period)
            .field("failsafe_gate", &self.monitor.is_some())
            .field("outputs", &self.outputs)
            .finish()
    }
}

struct Lane {
    bus: usize,
    encoding: FrameEncoding,
    tx: mpsc::Sender<Vec<u8>>,
}

impl TransmitScheduler {
    /// Creates a scheduler with no outputs and no failsafe gate
    pub fn new(period: Duration, table: Arc<ChannelTable>) -> Self {
        Self {
            period,
            table,
            monitor: None,
            outputs: Vec::new(),
            stats: Arc::new(TransmitStats::default()),
        }
    }

    /// Suppress transmission while `monitor` reports failsafe
    pub fn with_failsafe(mut self, monitor: Arc<LinkQualityMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Add a bus output
    pub fn with_output(mut self, output: BusOutput) -> Self {
        self.outputs.push(output);
        self
    }

    /// Tick period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<TransmitStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Self {
            period,
            table,
            monitor,
            outputs,
            stats,
        } = self;

        let mut lanes = Vec::with_capacity(outputs.len());
        let mut writers = Vec::with_capacity(outputs.len());
        for output in outputs {
            let (tx, rx) = mpsc::channel(1);
            lanes.push(Lane {
                bus: output.bus,
                encoding: output.encoding,
                tx,
            });
            writers.push(spawn_writer(output.sink, rx, Arc::clone(&stats)));
        }

        info!(
            "Starting transmit loop: {} output(s) every {:?}{}",
            lanes.len(),
            period,
            if monitor.is_some() { " with failsafe gate" } else { "" }
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    tick(&table, monitor.as_deref(), &lanes, &stats);
                }
            }
        }

        // Stop producing first, then let the writers finish and drop their sinks
        drop(lanes);
        for writer in writers {
            if let Err(e) = writer.await {
                warn!("Frame writer task ended abnormally: {}", e);
            }
        }

        let counts = stats.counts();
        info!(
            "Transmit loop stopped: {} ticks, {} sent, {} suppressed, {} dropped, {} failed",
            counts.ticks, counts.sent, counts.suppressed, counts.dropped, counts.failed
        );
    }
}

fn tick(
    table: &ChannelTable,
    monitor: Option<&LinkQualityMonitor>,
    lanes: &[Lane],
    stats: &TransmitStats,
) {
    let ticks = TransmitStats::bump(&stats.ticks);

    if monitor.is_some_and(LinkQualityMonitor::failsafe_active) {
        TransmitStats::bump(&stats.suppressed);
        trace!("Failsafe active, skipping tick {}", ticks);
        return;
    }

    for lane in lanes {
        let Some(bytes) = build_frame(table, lane.bus, lane.encoding) else {
            warn!("Bus {} is not in the channel table", lane.bus);
            continue;
        };

        match lane.tx.try_send(bytes) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                TransmitStats::bump(&stats.dropped);
                debug!("Bus {} writer busy, frame dropped", lane.bus);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                TransmitStats::bump(&stats.failed);
                warn!("Bus {} writer is gone", lane.bus);
            }
        }
    }

    if ticks % LOG_INTERVAL_TICKS == 0 {
        let counts = stats.counts();
        info!(
            "Transmitted {} frames over {} ticks ({} suppressed, {} dropped, {} failed)",
            counts.sent, counts.ticks, counts.suppressed, counts.dropped, counts.failed
        );
    }
}

fn spawn_writer(
    mut sink: Box<dyn FrameSink>,
    mut rx: mpsc::Receiver<Vec<u8>>,
    stats: Arc<TransmitStats>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = sink.describe();

        while let Some(bytes) = rx.recv().await {
            match sink.send(&bytes).await {
                Ok(()) => {
                    TransmitStats::bump(&stats.sent);
                }
                Err(e) => {
                    TransmitStats::bump(&stats.failed);
                    warn!("Failed to send frame to {}: {}", name, e);
                }
            }
        }

        debug!("Writer for {} closed", name);
    })
}
