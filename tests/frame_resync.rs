//! FrameSync recovery on noisy SBUS streams

use rc_bridge::sbus::decoder::decode;
use rc_bridge::sbus::encoder::encode;
use rc_bridge::sbus::protocol::{Channels, SbusFrame, SBUS_START_BYTE};
use rc_bridge::sbus::sync::FrameSync;

/// Small deterministic generator so failures are reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    fn below(&mut self, bound: u32) -> u32 {
        self.next() % bound
    }
}

/// A frame whose only start marker is byte 0
fn random_frame(rng: &mut Lcg) -> SbusFrame {
    loop {
        let mut channels: Channels = [0; 16];
        for value in channels.iter_mut() {
            *value = rng.below(2048) as u16;
        }
        let frame = encode(&channels);
        if !frame[1..].contains(&SBUS_START_BYTE) {
            return frame;
        }
    }
}

fn garbage(rng: &mut Lcg, max_len: u32) -> Vec<u8> {
    let len = rng.below(max_len + 1);
    (0..len).map(|_| rng.below(256) as u8).collect()
}

/// Count expected frames that show up, in order, in the output
fn matched_in_order(expected: &[SbusFrame], emitted: &[SbusFrame]) -> usize {
    let mut matched = 0;
    let mut rest = emitted.iter();
    for frame in expected {
        if rest.clone().any(|f| f == frame) {
            for f in rest.by_ref() {
                if f == frame {
                    break;
                }
            }
            matched += 1;
        }
    }
    matched
}

#[test]
fn test_clean_stream_loses_nothing() {
    let mut rng = Lcg(1);
    let frames: Vec<SbusFrame> = (0..50).map(|_| random_frame(&mut rng)).collect();
    let stream: Vec<u8> = frames.iter().flatten().copied().collect();

    let mut sync = FrameSync::new();
    let emitted = sync.push(&stream);

    assert_eq!(emitted, frames);
    assert_eq!(sync.dropped_bytes(), 0);
}

#[test]
fn test_at_most_one_frame_lost_per_burst() {
    for seed in 1..=20 {
        let mut rng = Lcg(seed);
        let frames: Vec<SbusFrame> = (0..100).map(|_| random_frame(&mut rng)).collect();

        let mut stream = garbage(&mut rng, 24);
        let mut bursts = usize::from(!stream.is_empty());
        for frame in &frames {
            stream.extend_from_slice(frame);
            let burst = garbage(&mut rng, 24);
            bursts += usize::from(!burst.is_empty());
            stream.extend(burst);
        }

        // arbitrary read sizes
        let mut sync = FrameSync::new();
        let mut emitted = Vec::new();
        let mut pos = 0;
        while pos < stream.len() {
            let end = (pos + 1 + rng.below(40) as usize).min(stream.len());
            emitted.extend(sync.push(&stream[pos..end]));
            pos = end;
        }

        let matched = matched_in_order(&frames, &emitted);
        assert!(
            frames.len() - matched <= bursts,
            "seed {}: lost {} frames over {} bursts",
            seed,
            frames.len() - matched,
            bursts
        );
        assert!(matched >= frames.len() / 2, "seed {}: only {} frames recovered", seed, matched);
    }
}

#[test]
fn test_emitted_frames_always_decode() {
    let mut rng = Lcg(99);
    let mut stream = Vec::new();
    for _ in 0..200 {
        stream.extend(garbage(&mut rng, 24));
        stream.extend_from_slice(&random_frame(&mut rng));
    }

    let mut sync = FrameSync::new();
    for frame in sync.push(&stream) {
        assert!(decode(&frame).is_ok());
    }
}

#[test]
fn test_unaligned_start() {
    let mut rng = Lcg(7);
    let first = random_frame(&mut rng);
    let second = random_frame(&mut rng);

    // join mid-frame, as when a reader opens a port on a live bus
    let mut stream = first[11..].to_vec();
    stream.extend_from_slice(&second);

    let mut sync = FrameSync::new();
    assert_eq!(sync.push(&stream), vec![second]);
}
