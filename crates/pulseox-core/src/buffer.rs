//! Circular sample store
//!
//! Three parallel rings (red, IR, seq) sharing one write cursor. The cursor
//! always points at the oldest slot, so unrolling is a rotation at the cursor.

use crate::config::PipelineConfig;
use crate::domain::{Packet, Sample};

/// Chronologically ordered copy of the ring contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnrolledSamples {
    pub seq: Vec<u32>,
    pub red: Vec<u32>,
    pub ir: Vec<u32>,
}

impl UnrolledSamples {
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CircularSampleBuffer {
    red: Vec<u32>,
    ir: Vec<u32>,
    seq: Vec<u32>,
    cursor: usize,
    samples_per_refresh: usize,
    primed: bool,
}

impl CircularSampleBuffer {
    /// # Arguments
    /// * `capacity` - Samples held (clamped to at least 1)
    /// * `samples_per_refresh` - Cursor multiple that marks a refresh boundary
    pub fn new(capacity: usize, samples_per_refresh: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            red: vec![0; capacity],
            ir: vec![0; capacity],
            seq: vec![0; capacity],
            cursor: 0,
            samples_per_refresh: samples_per_refresh.max(1),
            primed: false,
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(cfg.buffer_capacity, cfg.samples_per_refresh)
    }

    /// Store one packet.
    ///
    /// The very first sample ever written also fills the whole ring with its
    /// intensities and a synthetic, gap-free sequence ending at its own
    /// counter, so the first batches plot as a flat line instead of a ramp
    /// from zero.
    ///
    /// # Returns
    /// `true` when the cursor lands on a refresh boundary.
    pub fn write(&mut self, packet: &Packet) -> bool {
        for sample in packet {
            if !self.primed {
                self.back_fill(sample);
            }
            self.store(sample);
        }
        self.cursor % self.samples_per_refresh == 0
    }

    fn back_fill(&mut self, first: &Sample) {
        let cap = self.capacity();
        self.red.fill(first.red);
        self.ir.fill(first.ir);
        // Slot `cursor + k` holds `seq0 - cap + k`; the cursor slot itself
        // is overwritten with `seq0` right after.
        for k in 1..cap {
            let slot = (self.cursor + k) % cap;
            self.seq[slot] = first.seq.wrapping_sub((cap - k) as u32);
        }
        self.primed = true;
    }

    fn store(&mut self, sample: &Sample) {
        self.red[self.cursor] = sample.red;
        self.ir[self.cursor] = sample.ir;
        self.seq[self.cursor] = sample.seq;
        self.cursor = (self.cursor + 1) % self.capacity();
    }

    /// Contents oldest first. Does not move the cursor.
    pub fn unroll(&self) -> UnrolledSamples {
        UnrolledSamples {
            seq: rotated(&self.seq, self.cursor),
            red: rotated(&self.red, self.cursor),
            ir: rotated(&self.ir, self.cursor),
        }
    }

    /// Index of the oldest slot, the next one to be overwritten.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.seq.len()
    }

    pub fn samples_per_refresh(&self) -> usize {
        self.samples_per_refresh
    }

    /// Whether any sample has been written yet.
    pub fn is_primed(&self) -> bool {
        self.primed
    }
}

fn rotated(ring: &[u32], start: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(ring.len());
    out.extend_from_slice(&ring[start..]);
    out.extend_from_slice(&ring[..start]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn packet(start_seq: u32, red: u32, ir: u32) -> Packet {
        let mut p = [Sample::new(0, 0, 0); 5];
        for (k, s) in p.iter_mut().enumerate() {
            *s = Sample::new(red + k as u32, ir + k as u32, start_seq.wrapping_add(k as u32));
        }
        p
    }

    fn steps_by_one(seq: &[u32]) -> bool {
        seq.windows(2).all(|w| w[1].wrapping_sub(w[0]) == 1)
    }

    #[test]
    fn test_first_write_back_fills() {
        let mut buf = CircularSampleBuffer::new(20, 10);
        assert!(!buf.is_primed());

        let refresh = buf.write(&packet(1000, 500, 700));
        assert!(!refresh);
        assert!(buf.is_primed());
        assert_eq!(buf.cursor(), 5);

        let u = buf.unroll();
        assert_eq!(u.len(), 20);
        assert!(steps_by_one(&u.seq));
        assert_eq!(*u.seq.last().unwrap(), 1004);
        assert_eq!(u.seq[15], 1000);
        assert_eq!(u.seq[0], 1000 - 15);

        // Flat until the real samples
        assert!(u.red[..16].iter().all(|&r| r == 500));
        assert_eq!(&u.red[16..], &[501, 502, 503, 504]);
        assert!(u.ir[..16].iter().all(|&v| v == 700));
    }

    #[test]
    fn test_back_fill_wraps_below_zero() {
        let mut buf = CircularSampleBuffer::new(15, 5);
        buf.write(&packet(3, 10, 10));
        let u = buf.unroll();
        assert!(steps_by_one(&u.seq));
        assert_eq!(u.seq[0], 3u32.wrapping_sub(10));
    }

    #[test]
    fn test_back_fill_happens_once() {
        let mut buf = CircularSampleBuffer::new(10, 5);
        buf.write(&packet(0, 100, 100));
        buf.write(&packet(5, 900, 900));
        let u = buf.unroll();
        assert_eq!(u.seq, (0..10).collect::<Vec<u32>>());
        assert_eq!(&u.red[5..], &[900, 901, 902, 903, 904]);
    }

    #[test]
    fn test_refresh_boundaries() {
        let mut buf = CircularSampleBuffer::new(1500, 45);
        let mut boundaries = Vec::new();
        for k in 0..300u32 {
            if buf.write(&packet(k * 5, 1, 1)) {
                boundaries.push(buf.cursor());
            }
        }
        // One lap; the wrap back to 0 counts as a boundary too
        assert_eq!(&boundaries[..3], &[45, 90, 135]);
        assert!(boundaries.iter().all(|c| c % 45 == 0));
        assert_eq!(boundaries.len(), 34);
    }

    #[test]
    fn test_unroll_keeps_cursor() {
        let mut buf = CircularSampleBuffer::new(10, 5);
        buf.write(&packet(0, 1, 1));
        buf.write(&packet(5, 1, 1));
        buf.write(&packet(10, 1, 1));
        let c = buf.cursor();
        let u = buf.unroll();
        assert_eq!(buf.cursor(), c);
        assert_eq!(u.seq, (5..15).collect::<Vec<u32>>());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_unroll_is_chronological(
            capacity in 5usize..200,
            packets in 1usize..120,
            start in any::<u32>(),
        ) {
            let mut buf = CircularSampleBuffer::new(capacity, 5);
            for k in 0..packets {
                buf.write(&packet(start.wrapping_add(5 * k as u32), 10, 10));
            }
            let u = buf.unroll();
            prop_assert_eq!(u.len(), capacity);
            prop_assert!(steps_by_one(&u.seq));
            prop_assert_eq!(
                *u.seq.last().unwrap(),
                start.wrapping_add(5 * packets as u32 - 1)
            );
        }
    }
}
