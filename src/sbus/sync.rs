//! # SBUS Frame Synchronizer
//!
//! Extracts marker-valid 25-byte SBUS frames from a raw serial byte stream.
//!
//! Reads may arrive in fragments of any size, start in the middle of a frame,
//! or carry corrupted bytes. The synchronizer keeps its state between calls:
//!
//! - **Searching**: bytes are discarded until a start marker (`0x0F`) shows up.
//! - **Collecting**: bytes are appended to the candidate frame until it holds
//!   25 bytes. A candidate with valid markers is emitted. Otherwise the
//!   candidate is scanned for the next start marker after offset 0 and
//!   collection resumes from there, keeping the bytes already read. Only if no
//!   start marker is left is the candidate dropped.
//!
//! ## Usage
//!
//! ```
//! use rc_bridge::sbus::encoder::encode;
//! use rc_bridge::sbus::sync::FrameSync;
//!
//! let frame = encode(&[1024; 16]);
//! let mut sync = FrameSync::new();
//!
//! assert!(sync.push(&frame[..10]).is_empty());
//! let frames = sync.push(&frame[10..]);
//! assert_eq!(frames, vec![frame]);
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use super::decoder::check_markers;
use super::protocol::*;

/// Observable synchronizer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Waiting for a start marker
    Searching,
    /// Holding this many bytes of a candidate frame
    Collecting(usize),
}

/// Stateful byte-stream scanner for SBUS frames
#[derive(Debug)]
pub struct FrameSync {
    /// Candidate frame. Non-empty implies `candidate[0] == SBUS_START_BYTE`.
    candidate: BytesMut,
    frames: u64,
    dropped_bytes: u64,
}

impl Default for FrameSync {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSync {
    /// Creates a synchronizer in the `Searching` state
    pub fn new() -> Self {
        Self {
            candidate: BytesMut::with_capacity(SBUS_FRAME_LEN),
            frames: 0,
            dropped_bytes: 0,
        }
    }

    /// Feed a chunk of bytes and collect every frame it completes
    pub fn push(&mut self, data: &[u8]) -> Vec<SbusFrame> {
        data.iter().filter_map(|&byte| self.push_byte(byte)).collect()
    }

    /// Feed a single byte
    ///
    /// Returns a frame when this byte completes a marker-valid candidate.
    pub fn push_byte(&mut self, byte: u8) -> Option<SbusFrame> {
        if self.candidate.is_empty() && byte != SBUS_START_BYTE {
            self.dropped_bytes += 1;
            return None;
        }

        self.candidate.put_u8(byte);
        if self.candidate.len() < SBUS_FRAME_LEN {
            return None;
        }

        let mut frame = [0u8; SBUS_FRAME_LEN];
        frame.copy_from_slice(&self.candidate[..SBUS_FRAME_LEN]);

        match check_markers(&frame) {
            Ok(()) => {
                self.candidate.clear();
                self.frames += 1;
                Some(frame)
            }
            Err(e) => {
                trace!("Resynchronizing SBUS stream: {}", e);
                self.resync();
                None
            }
        }
    }

    /// Move the candidate to the next start marker after offset 0
    fn resync(&mut self) {
        match self.candidate[1..].iter().position(|&b| b == SBUS_START_BYTE) {
            Some(pos) => {
                let skip = pos + 1;
                self.candidate.advance(skip);
                self.dropped_bytes += skip as u64;
            }
            None => {
                self.dropped_bytes += self.candidate.len() as u64;
                self.candidate.clear();
            }
        }
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        if self.candidate.is_empty() {
            SyncState::Searching
        } else {
            SyncState::Collecting(self.candidate.len())
        }
    }

    /// Number of valid frames emitted so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Number of bytes discarded while searching or resynchronizing
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    /// Drop any partial candidate and return to `Searching`
    ///
    /// The discarded bytes are counted in [`dropped_bytes`](Self::dropped_bytes).
    pub fn reset(&mut self) {
        self.dropped_bytes += self.candidate.len() as u64;
        self.candidate.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbus::encoder::encode;

    fn frame_with(value: u16) -> SbusFrame {
        encode(&[value; SBUS_NUM_CHANNELS])
    }

    #[test]
    fn test_single_frame() {
        let frame = frame_with(SBUS_CHANNEL_VALUE_CENTER);
        let mut sync = FrameSync::new();

        assert_eq!(sync.push(&frame), vec![frame]);
        assert_eq!(sync.state(), SyncState::Searching);
        assert_eq!(sync.frames(), 1);
        assert_eq!(sync.dropped_bytes(), 0);
    }

    #[test]
    fn test_fragmented_reads() {
        let a = frame_with(SBUS_CHANNEL_VALUE_CENTER);
        let b = frame_with(0);
        let stream: Vec<u8> = a.iter().chain(b.iter()).copied().collect();

        for chunk_size in [1, 2, 3, 7, 24, 26] {
            let mut sync = FrameSync::new();
            let frames: Vec<_> = stream.chunks(chunk_size).flat_map(|c| sync.push(c)).collect();
            assert_eq!(frames, vec![a, b], "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_state_persists_between_calls() {
        let frame = frame_with(SBUS_CHANNEL_VALUE_CENTER);
        let mut sync = FrameSync::new();

        sync.push(&frame[..5]);
        assert_eq!(sync.state(), SyncState::Collecting(5));
        sync.push(&frame[5..20]);
        assert_eq!(sync.state(), SyncState::Collecting(20));
        assert_eq!(sync.push(&frame[20..]), vec![frame]);
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let frame = frame_with(SBUS_CHANNEL_VALUE_CENTER);
        let mut sync = FrameSync::new();

        assert!(sync.push(&[0x55, 0xAA, 0x00, 0x01]).is_empty());
        assert_eq!(sync.dropped_bytes(), 4);
        assert_eq!(sync.push(&frame), vec![frame]);
    }

    #[test]
    fn test_mid_frame_start() {
        // 1024-pattern payload contains no 0x0F byte
        let frame = frame_with(SBUS_CHANNEL_VALUE_CENTER);
        let mut stream = frame[7..].to_vec();
        stream.extend_from_slice(&frame);
        stream.extend_from_slice(&frame);

        let mut sync = FrameSync::new();
        assert_eq!(sync.push(&stream), vec![frame, frame]);
    }

    #[test]
    fn test_resync_keeps_following_frame() {
        // A stray start marker right before a real frame makes the first
        // candidate misaligned; the rescan must land on the real frame
        // instead of throwing its bytes away.
        let frame = frame_with(SBUS_CHANNEL_VALUE_CENTER);
        let mut stream = vec![SBUS_START_BYTE, 0x33];
        stream.extend_from_slice(&frame);

        let mut sync = FrameSync::new();
        let frames = sync.push(&stream);

        assert_eq!(frames, vec![frame]);
        assert_eq!(sync.dropped_bytes(), 2);
    }

    #[test]
    fn test_candidate_without_marker_is_dropped() {
        let mut sync = FrameSync::new();
        let mut junk = vec![SBUS_START_BYTE];
        junk.extend_from_slice(&[0x55; 24]);

        assert!(sync.push(&junk).is_empty());
        assert_eq!(sync.state(), SyncState::Searching);
        assert_eq!(sync.dropped_bytes(), 25);
    }

    #[test]
    fn test_corrupted_end_marker_recovers() {
        let good = frame_with(SBUS_CHANNEL_VALUE_CENTER);
        let mut bad = good;
        bad[24] = 0x42;

        let mut stream = bad.to_vec();
        stream.extend_from_slice(&good);

        let mut sync = FrameSync::new();
        assert_eq!(sync.push(&stream), vec![good]);
    }

    #[test]
    fn test_reset() {
        let frame = frame_with(SBUS_CHANNEL_VALUE_CENTER);
        let mut sync = FrameSync::new();

        sync.push(&frame[..12]);
        assert_eq!(sync.dropped_bytes(), 0);

        sync.reset();
        assert_eq!(sync.state(), SyncState::Searching);
        assert_eq!(sync.dropped_bytes(), 12);

        assert_eq!(sync.push(&frame), vec![frame]);
        assert_eq!(sync.dropped_bytes(), 12);
    }
}
