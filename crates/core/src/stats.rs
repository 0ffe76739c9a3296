//! Counters shared between the real-time paths and the console.
//!
//! All updates are relaxed atomic adds; the numbers are for reporting only.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct PipelineStats {
    samples_captured: AtomicU64,
    samples_played: AtomicU64,
    frames_processed: AtomicU64,
    frames_passed_through: AtomicU64,
    engine_errors: AtomicU64,
    samples_dropped: AtomicU64,
    samples_underrun: AtomicU64,
    samples_trimmed: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub samples_captured: u64,
    pub samples_played: u64,
    pub frames_processed: u64,
    pub frames_passed_through: u64,
    pub engine_errors: u64,
    /// Ring buffer overflow (newest samples dropped)
    pub samples_dropped: u64,
    /// Ring buffer underrun (silence substituted)
    pub samples_underrun: u64,
    /// Discarded by the accumulator overflow guard
    pub samples_trimmed: u64,
}

fn add(counter: &AtomicU64, n: usize) {
    if n > 0 {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

impl PipelineStats {
    pub fn record_captured(&self, n: usize) {
        add(&self.samples_captured, n);
    }

    pub fn record_played(&self, real: usize, padded: usize) {
        add(&self.samples_played, real);
        add(&self.samples_underrun, padded);
    }

    pub fn record_processed(&self) {
        add(&self.frames_processed, 1);
    }

    pub fn record_passed_through(&self) {
        add(&self.frames_passed_through, 1);
    }

    pub fn record_engine_error(&self) {
        add(&self.engine_errors, 1);
    }

    pub fn record_dropped(&self, n: usize) {
        add(&self.samples_dropped, n);
    }

    pub fn record_trimmed(&self, n: usize) {
        add(&self.samples_trimmed, n);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_captured: self.samples_captured.load(Ordering::Relaxed),
            samples_played: self.samples_played.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_passed_through: self.frames_passed_through.load(Ordering::Relaxed),
            engine_errors: self.engine_errors.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            samples_underrun: self.samples_underrun.load(Ordering::Relaxed),
            samples_trimmed: self.samples_trimmed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_updates() {
        let stats = PipelineStats::default();
        stats.record_captured(480);
        stats.record_played(400, 80);
        stats.record_processed();
        stats.record_dropped(0);
        stats.record_trimmed(12);

        let snap = stats.snapshot();
        assert_eq!(snap.samples_captured, 480);
        assert_eq!(snap.samples_played, 400);
        assert_eq!(snap.samples_underrun, 80);
        assert_eq!(snap.frames_processed, 1);
        assert_eq!(snap.samples_dropped, 0);
        assert_eq!(snap.samples_trimmed, 12);
    }
}
