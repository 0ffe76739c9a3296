//! Frame accumulator for bridging driver-sized capture bursts to fixed-size
//! processing frames.
//!
//! Capture drivers pick their own callback sizes. The engine only accepts
//! exactly [`FRAME_SIZE`](crate::constants::FRAME_SIZE) samples, so bursts are
//! collected here and handed out one whole frame at a time.

use std::slice::ChunksExact;

/// Collects arbitrary bursts and re-chunks them into `frame_size` frames.
///
/// Not synchronised on its own; the capture path keeps it behind a mutex.
pub struct FrameAccumulator {
    samples: Vec<f32>,
    // Prefix of `samples` already handed out by the last `drain_frames` call.
    consumed: usize,
    frame_size: usize,
    guard_frames: usize,
}

impl FrameAccumulator {
    /// Creates an accumulator for frames of `frame_size` samples whose overflow
    /// guard fires once more than `guard_frames` frames are pending.
    ///
    /// # Panics
    /// Panics if `frame_size` is zero.
    pub fn new(frame_size: usize, guard_frames: usize) -> Self {
        assert!(frame_size > 0, "frame size must be non-zero");
        let guard_frames = guard_frames.max(1);
        Self {
            samples: Vec::with_capacity(frame_size * (guard_frames + 2)),
            consumed: 0,
            frame_size,
            guard_frames,
        }
    }

    /// Appends a capture burst.
    pub fn push(&mut self, burst: &[f32]) {
        self.compact();
        self.samples.extend_from_slice(burst);
    }

    /// Removes every complete frame and yields them oldest first.
    ///
    /// The frames count as removed as soon as this is called, whether or not the
    /// iterator is run to the end.
    pub fn drain_frames(&mut self) -> ChunksExact<'_, f32> {
        self.compact();
        let whole = self.samples.len() / self.frame_size * self.frame_size;
        self.consumed = whole;
        self.samples[..whole].chunks_exact(self.frame_size)
    }

    /// Overflow guard. If more than `guard_frames` frames worth of samples are
    /// pending, drops the oldest ones so exactly one frame remains.
    ///
    /// Returns the number of samples discarded.
    pub fn enforce_limit(&mut self) -> usize {
        if self.len() <= self.guard_frames * self.frame_size {
            return 0;
        }
        self.compact();
        let excess = self.samples.len() - self.frame_size;
        self.samples.drain(..excess);
        excess
    }

    /// Pending samples not yet handed out as a frame.
    pub fn len(&self) -> usize {
        self.samples.len() - self.consumed
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn guard_frames(&self) -> usize {
        self.guard_frames
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.consumed = 0;
    }

    fn compact(&mut self) {
        if self.consumed > 0 {
            self.samples.drain(..self.consumed);
            self.consumed = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FRAME_SIZE, GUARD_FRAMES};

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_bursts_rechunk_in_order() {
        let mut acc = FrameAccumulator::new(FRAME_SIZE, GUARD_FRAMES);
        let bursts = [128usize, 512, 77, 403, 320];
        let total: usize = bursts.iter().sum();
        assert_eq!(total % FRAME_SIZE, 0);

        let mut frames: Vec<Vec<f32>> = Vec::new();
        let mut offset = 0;
        for len in bursts {
            acc.push(&ramp(offset, len));
            offset += len;
            frames.extend(acc.drain_frames().map(|f| f.to_vec()));
        }

        assert_eq!(frames.len(), total / FRAME_SIZE);
        assert!(frames.iter().all(|f| f.len() == FRAME_SIZE));
        let flat: Vec<f32> = frames.concat();
        assert_eq!(flat, ramp(0, total));
        assert!(acc.is_empty());
    }

    #[test]
    fn test_three_bursts_make_one_frame() {
        let mut acc = FrameAccumulator::new(FRAME_SIZE, GUARD_FRAMES);

        acc.push(&[0.1; 200]);
        assert_eq!(acc.drain_frames().count(), 0);
        assert_eq!(acc.len(), 200);

        acc.push(&[0.2; 200]);
        assert_eq!(acc.drain_frames().count(), 0);
        assert_eq!(acc.len(), 400);

        acc.push(&[0.3; 80]);
        let frames: Vec<Vec<f32>> = acc.drain_frames().map(|f| f.to_vec()).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), FRAME_SIZE);
        assert_eq!(frames[0][199], 0.1);
        assert_eq!(frames[0][399], 0.2);
        assert_eq!(frames[0][479], 0.3);
        assert_eq!(acc.len(), 0);
    }

    #[test]
    fn test_large_burst_yields_several_frames() {
        let mut acc = FrameAccumulator::new(FRAME_SIZE, GUARD_FRAMES);
        acc.push(&ramp(0, FRAME_SIZE * 3 + 10));
        assert_eq!(acc.drain_frames().len(), 3);
        assert_eq!(acc.len(), 10);
    }

    #[test]
    fn test_drain_removes_even_if_not_iterated() {
        let mut acc = FrameAccumulator::new(4, 2);
        acc.push(&ramp(0, 9));
        let _ = acc.drain_frames();
        assert_eq!(acc.len(), 1);

        acc.push(&ramp(9, 3));
        let frame: Vec<f32> = acc.drain_frames().flatten().copied().collect();
        assert_eq!(frame, vec![8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_guard_trims_to_one_frame() {
        let mut acc = FrameAccumulator::new(FRAME_SIZE, GUARD_FRAMES);
        acc.push(&ramp(0, FRAME_SIZE * 2 + 1));

        let dropped = acc.enforce_limit();
        assert_eq!(dropped, FRAME_SIZE + 1);
        assert_eq!(acc.len(), FRAME_SIZE);

        // The newest samples survive
        let frame: Vec<f32> = acc.drain_frames().flatten().copied().collect();
        assert_eq!(frame, ramp(FRAME_SIZE + 1, FRAME_SIZE));
    }

    #[test]
    fn test_guard_is_noop_at_threshold() {
        let mut acc = FrameAccumulator::new(FRAME_SIZE, GUARD_FRAMES);
        acc.push(&[0.0; FRAME_SIZE * 2]);
        assert_eq!(acc.enforce_limit(), 0);
        assert_eq!(acc.len(), FRAME_SIZE * 2);
    }

    #[test]
    fn test_guard_threshold_is_tunable() {
        let mut acc = FrameAccumulator::new(10, 4);
        acc.push(&[0.0; 40]);
        assert_eq!(acc.enforce_limit(), 0);
        acc.push(&[0.0; 1]);
        assert_eq!(acc.enforce_limit(), 31);
        assert_eq!(acc.len(), 10);
    }

    #[test]
    fn test_zero_guard_is_raised_to_one() {
        let acc = FrameAccumulator::new(FRAME_SIZE, 0);
        assert_eq!(acc.guard_frames(), 1);
    }
}
