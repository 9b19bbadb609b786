//! # Channel Table Module
//!
//! The shared store of current channel values for up to two SBUS buses.
//!
//! Every producer (serial SBUS reader, PPM poller, tty packet decoder, UDP
//! receiver) writes here, and the transmit scheduler reads consistent
//! per-bus snapshots. Buses and channels are 1-indexed in this API.
//!
//! A single mutex guards the whole table, so a snapshot never mixes two
//! writes to the same bus.
//!
//! ## Usage
//!
//! ```
//! use rc_bridge::channels::ChannelTable;
//!
//! let table = ChannelTable::new();
//! table.set(1, 3, 1500);
//! assert_eq!(table.get(1, 3), Some(1500));
//! assert_eq!(table.snapshot(1).unwrap()[2], 1500);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::sbus::protocol::{Channels, SBUS_CHANNEL_VALUE_MAX, SBUS_NUM_CHANNELS};

/// Number of SBUS buses held by the table
pub const BUS_COUNT: usize = 2;

/// Mutex-guarded channel values for every bus
#[derive(Debug, Default)]
pub struct ChannelTable {
    buses: Mutex<[Channels; BUS_COUNT]>,
}

impl ChannelTable {
    /// Creates a table with every channel at 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table with every channel of every bus at `value` (clamped)
    pub fn filled(value: i32) -> Self {
        Self {
            buses: Mutex::new([[clamp_value(value); SBUS_NUM_CHANNELS]; BUS_COUNT]),
        }
    }

    /// Overwrite one channel
    ///
    /// `value` is clamped to 0..=2047. A write to a bus outside 1..=2 or a
    /// channel outside 1..=16 is ignored.
    pub fn set(&self, bus: usize, channel: usize, value: i32) {
        let Some((b, c)) = slot(bus, channel) else {
            warn!("Ignoring write to invalid slot bus={} channel={}", bus, channel);
            return;
        };

        self.lock()[b][c] = clamp_value(value);
    }

    /// Overwrite all 16 channels of a bus in one critical section
    pub fn set_bus(&self, bus: usize, channels: &Channels) {
        let Some(b) = bus_index(bus) else {
            warn!("Ignoring write to invalid bus {}", bus);
            return;
        };

        let clamped = channels.map(|v| v.min(SBUS_CHANNEL_VALUE_MAX));
        self.lock()[b] = clamped;
    }

    /// Read one channel, `None` for an invalid slot
    pub fn get(&self, bus: usize, channel: usize) -> Option<u16> {
        let (b, c) = slot(bus, channel)?;
        Some(self.lock()[b][c])
    }

    /// Point-in-time copy of a bus, `None` for an invalid bus
    pub fn snapshot(&self, bus: usize) -> Option<Channels> {
        let b = bus_index(bus)?;
        Some(self.lock()[b])
    }

    fn lock(&self) -> MutexGuard<'_, [Channels; BUS_COUNT]> {
        // Writers never leave a half-updated slot behind, so a poisoned
        // table is still consistent.
        self.buses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn bus_index(bus: usize) -> Option<usize> {
    (1..=BUS_COUNT).contains(&bus).then(|| bus - 1)
}

fn slot(bus: usize, channel: usize) -> Option<(usize, usize)> {
    let b = bus_index(bus)?;
    (1..=SBUS_NUM_CHANNELS)
        .contains(&channel)
        .then(|| (b, channel - 1))
}

fn clamp_value(value: i32) -> u16 {
    value.clamp(0, i32::from(SBUS_CHANNEL_VALUE_MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_table_is_zeroed() {
        let table = ChannelTable::new();
        assert_eq!(table.snapshot(1), Some([0; 16]));
        assert_eq!(table.snapshot(2), Some([0; 16]));
    }

    #[test]
    fn test_filled_table() {
        let table = ChannelTable::filled(1024);
        assert_eq!(table.get(2, 16), Some(1024));

        let clamped = ChannelTable::filled(9000);
        assert_eq!(clamped.get(1, 1), Some(2047));
    }

    #[test]
    fn test_set_and_get_one_indexed() {
        let table = ChannelTable::new();
        table.set(1, 1, 100);
        table.set(2, 16, 200);

        assert_eq!(table.get(1, 1), Some(100));
        assert_eq!(table.get(2, 16), Some(200));
        assert_eq!(table.snapshot(1).unwrap()[0], 100);
        assert_eq!(table.snapshot(2).unwrap()[15], 200);
    }

    #[test]
    fn test_set_clamps_instead_of_wrapping() {
        let table = ChannelTable::new();

        table.set(1, 1, 2048);
        assert_eq!(table.get(1, 1), Some(2047));

        table.set(1, 2, -5);
        assert_eq!(table.get(1, 2), Some(0));

        // 65536 + 10 would wrap to 10 if truncated to u16
        table.set(1, 3, 65_546);
        assert_eq!(table.get(1, 3), Some(2047));
    }

    #[test]
    fn test_invalid_slots_are_ignored() {
        let table = ChannelTable::new();

        table.set(0, 1, 500);
        table.set(3, 1, 500);
        table.set(1, 0, 500);
        table.set(1, 17, 500);

        assert_eq!(table.snapshot(1), Some([0; 16]));
        assert_eq!(table.snapshot(2), Some([0; 16]));
        assert_eq!(table.get(0, 1), None);
        assert_eq!(table.get(1, 17), None);
        assert_eq!(table.snapshot(3), None);
    }

    #[test]
    fn test_set_bus_overwrites_and_clamps() {
        let table = ChannelTable::new();
        let mut values = [1500u16; 16];
        values[4] = 4000;

        table.set_bus(2, &values);

        let snap = table.snapshot(2).unwrap();
        assert_eq!(snap[0], 1500);
        assert_eq!(snap[4], 2047);
        assert_eq!(table.snapshot(1), Some([0; 16]));
    }

    #[test]
    fn test_last_write_wins() {
        let table = ChannelTable::new();
        table.set(1, 5, 10);
        table.set(1, 5, 20);
        assert_eq!(table.get(1, 5), Some(20));
    }

    #[test]
    fn test_concurrent_writers_distinct_channels() {
        let table = Arc::new(ChannelTable::new());

        let handles: Vec<_> = (1..=16)
            .map(|ch| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for round in 0..1000 {
                        table.set(1, ch, (ch * 100 + round % 7) as i32);
                    }
                    table.set(1, ch, (ch * 100) as i32);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snap = table.snapshot(1).unwrap();
        for ch in 1..=16 {
            assert_eq!(snap[ch - 1], (ch * 100) as u16, "channel {}", ch);
        }
    }

    #[test]
    fn test_snapshot_never_torn() {
        // Writers always store a whole bus of identical values, so any
        // snapshot must be uniform.
        let table = Arc::new(ChannelTable::new());
        let writer = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for v in 0..2000u16 {
                    table.set_bus(1, &[v; 16]);
                }
            })
        };

        for _ in 0..2000 {
            let snap = table.snapshot(1).unwrap();
            assert!(snap.iter().all(|&v| v == snap[0]));
        }

        writer.join().unwrap();
    }
}
