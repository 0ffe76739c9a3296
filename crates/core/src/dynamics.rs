//! Per-sample dynamics stages: noise gate, compressor and de-esser.
//!
//! All levels are linear amplitudes on the normalized [-1.0, 1.0] scale.
//! Envelopes use one-pole attack/release followers.

use crate::constants::SAMPLE_RATE;
use crate::filters::Filter;
use anyhow::Result;

pub const GATE_THRESHOLD_DB: f32 = -40.0;
pub const GATE_HYSTERESIS_DB: f32 = 10.0;
pub const COMPRESSOR_THRESHOLD_DB: f32 = -20.0;
pub const COMPRESSOR_RATIO: f32 = 3.0;

const DEESSER_CENTER_HZ: f32 = 6500.0;
const DEESSER_Q: f32 = 2.0;
const DEESSER_THRESHOLD_DB: f32 = -12.0;
const DEESSER_RATIO: f32 = 2.0;
// Never cut sibilants by more than about 10dB
const DEESSER_MIN_GAIN: f32 = 0.3;

// Noise floor window: 3s of frames
const FLOOR_WINDOW: usize = 300;

pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        -100.0
    } else {
        20.0 * linear.log10()
    }
}

fn time_coeff(ms: f32) -> f32 {
    1.0 - (-1.0 / (ms / 1000.0 * SAMPLE_RATE as f32)).exp()
}

#[inline]
fn follow(envelope: &mut f32, level: f32, attack: f32, release: f32) {
    let coeff = if level > *envelope { attack } else { release };
    *envelope += coeff * (level - *envelope);
}

/// Gain in dB for `ratio`:1 compression of an envelope above `threshold_db`.
fn compression_db(envelope: f32, threshold_db: f32, ratio: f32) -> f32 {
    let envelope_db = linear_to_db(envelope);
    (threshold_db - envelope_db) + (envelope_db - threshold_db) / ratio
}

/// Noise gate with hysteresis, a short hold and click-free gain ramps.
pub struct NoiseGate {
    threshold_db: f32,
    hysteresis_db: f32,
    open_level: f32,
    close_level: f32,
    attack: f32,
    release: f32,
    hold_samples: usize,
    envelope: f32,
    open: bool,
    hold: usize,
    gain: f32,
}

impl NoiseGate {
    pub fn new(threshold_db: f32, hysteresis_db: f32) -> Self {
        let mut gate = Self {
            threshold_db,
            hysteresis_db,
            open_level: 0.0,
            close_level: 0.0,
            attack: time_coeff(1.0),
            release: time_coeff(50.0),
            hold_samples: SAMPLE_RATE as usize / 100,
            envelope: 0.0,
            open: false,
            hold: 0,
            gain: 0.0,
        };
        gate.set_threshold_db(threshold_db);
        gate
    }

    /// Opens above `threshold_db`, closes below `threshold_db - hysteresis`.
    pub fn set_threshold_db(&mut self, threshold_db: f32) {
        self.threshold_db = threshold_db;
        self.open_level = db_to_linear(threshold_db);
        self.close_level = db_to_linear(threshold_db - self.hysteresis_db);
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn process(&mut self, frame: &mut [f32]) {
        for sample in frame.iter_mut() {
            follow(&mut self.envelope, sample.abs(), self.attack, self.release);

            if self.open {
                if self.envelope >= self.close_level {
                    self.hold = self.hold_samples;
                } else if self.hold > 0 {
                    self.hold -= 1;
                } else {
                    self.open = false;
                }
            } else if self.envelope > self.open_level {
                self.open = true;
                self.hold = self.hold_samples;
            }

            let target = if self.open { 1.0 } else { 0.0 };
            follow(&mut self.gain, target, self.attack, self.release);
            *sample *= self.gain;
        }
    }
}

/// Downward compressor with fixed makeup gain and hard clipping at ±1.
pub struct Compressor {
    threshold_db: f32,
    threshold: f32,
    ratio: f32,
    makeup: f32,
    attack: f32,
    release: f32,
    envelope: f32,
}

impl Compressor {
    pub fn new(threshold_db: f32, ratio: f32) -> Self {
        Self {
            threshold_db,
            threshold: db_to_linear(threshold_db),
            ratio,
            makeup: 10.0f32.powf(-threshold_db * (1.0 - 1.0 / ratio) / 40.0),
            attack: time_coeff(10.0),
            release: time_coeff(50.0),
            envelope: 0.0,
        }
    }

    pub fn makeup_gain(&self) -> f32 {
        self.makeup
    }

    pub fn process(&mut self, frame: &mut [f32]) {
        for sample in frame.iter_mut() {
            follow(&mut self.envelope, sample.abs(), self.attack, self.release);

            let gain = if self.envelope > self.threshold {
                db_to_linear(compression_db(self.envelope, self.threshold_db, self.ratio))
            } else {
                1.0
            };
            *sample = (*sample * gain * self.makeup).clamp(-1.0, 1.0);
        }
    }
}

/// Broadband de-esser keyed from a band-pass sidechain around 6.5 kHz.
pub struct DeEsser {
    sidechain: Filter,
    threshold: f32,
    attack: f32,
    release: f32,
    envelope: f32,
}

impl DeEsser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            sidechain: Filter::band_pass(DEESSER_CENTER_HZ, DEESSER_Q)?,
            threshold: db_to_linear(DEESSER_THRESHOLD_DB),
            attack: time_coeff(1.0),
            release: time_coeff(50.0),
            envelope: 0.0,
        })
    }

    pub fn process(&mut self, frame: &mut [f32]) {
        for sample in frame.iter_mut() {
            let key = self.sidechain.run(*sample).abs();
            follow(&mut self.envelope, key, self.attack, self.release);

            if self.envelope > self.threshold {
                let gain = db_to_linear(compression_db(
                    self.envelope,
                    DEESSER_THRESHOLD_DB,
                    DEESSER_RATIO,
                ));
                *sample *= gain.max(DEESSER_MIN_GAIN);
            }
        }
    }
}

/// Tracks minimum RMS over a sliding window to estimate noise floor.
/// Uses a fixed-size ring buffer (3s at 100 frames/sec) to avoid allocations.
pub struct NoiseFloorTracker {
    window: [f32; FLOOR_WINDOW],
    write_idx: usize,
    count: usize,
    current_floor: f32,
}

impl Default for NoiseFloorTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseFloorTracker {
    pub fn new() -> Self {
        Self {
            window: [0.0; FLOOR_WINDOW],
            write_idx: 0,
            count: 0,
            current_floor: 0.01,
        }
    }

    pub fn update(&mut self, rms: f32) {
        self.window[self.write_idx] = rms;
        self.write_idx = (self.write_idx + 1) % FLOOR_WINDOW;
        self.count = (self.count + 1).min(FLOOR_WINDOW);

        if self.count < 10 {
            return;
        }

        // Minimum over the last 30 frames (~300ms), ignoring digital silence
        let recent = self.count.min(30);
        let start = (self.write_idx + FLOOR_WINDOW - recent) % FLOOR_WINDOW;
        let min_val = (0..recent)
            .map(|i| self.window[(start + i) % FLOOR_WINDOW])
            .filter(|&v| v > 0.0001)
            .fold(f32::MAX, f32::min);

        if min_val < f32::MAX {
            self.current_floor = self.current_floor.mul_add(0.95, min_val * 0.05);
        }
    }

    pub fn floor(&self) -> f32 {
        self.current_floor
    }

    /// Gate opening level that sits just above the tracked floor.
    pub fn gate_threshold(&self) -> f32 {
        self.current_floor.mul_add(1.5, 0.003).clamp(0.005, 0.08)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FRAME_SIZE;
    use crate::filters::tests::{rms, sine_frames};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_db_conversions() {
        assert_abs_diff_eq!(db_to_linear(-20.0), 0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(linear_to_db(0.01), -40.0, epsilon = 1e-4);
        assert_eq!(linear_to_db(0.0), -100.0);
    }

    // ── NoiseGate ────────────────────────────────────────────────

    #[test]
    fn test_gate_mutes_low_noise() {
        let mut gate = NoiseGate::new(GATE_THRESHOLD_DB, GATE_HYSTERESIS_DB);
        for frame in sine_frames(440.0, 0.003, 20) {
            let mut out = frame;
            gate.process(&mut out);
            assert!(rms(&out) < 1e-4, "noise below threshold leaked: {}", rms(&out));
        }
        assert!(!gate.is_open());
    }

    #[test]
    fn test_gate_passes_speech_level() {
        let mut gate = NoiseGate::new(GATE_THRESHOLD_DB, GATE_HYSTERESIS_DB);
        let frames = sine_frames(440.0, 0.3, 10);
        let mut ratio = 0.0;
        for frame in &frames {
            let mut out = *frame;
            gate.process(&mut out);
            ratio = rms(&out) / rms(frame);
        }
        assert!(gate.is_open());
        assert!(ratio > 0.99, "open gate should be transparent: {}", ratio);
    }

    #[test]
    fn test_gate_hysteresis_holds_open() {
        let mut gate = NoiseGate::new(GATE_THRESHOLD_DB, GATE_HYSTERESIS_DB);
        for frame in sine_frames(440.0, 0.3, 5) {
            let mut out = frame;
            gate.process(&mut out);
        }
        // -43 dB peak sits between the close (-50 dB) and open (-40 dB) levels
        for frame in sine_frames(440.0, 0.007, 50) {
            let mut out = frame;
            gate.process(&mut out);
        }
        assert!(gate.is_open());
    }

    #[test]
    fn test_gate_closes_on_silence() {
        let mut gate = NoiseGate::new(GATE_THRESHOLD_DB, GATE_HYSTERESIS_DB);
        for frame in sine_frames(440.0, 0.5, 5) {
            let mut out = frame;
            gate.process(&mut out);
        }
        let mut frame = [0.0f32; FRAME_SIZE];
        for _ in 0..100 {
            frame.fill(0.0);
            gate.process(&mut frame);
        }
        assert!(!gate.is_open());

        // Anything still below the threshold comes out attenuated to nothing
        let mut quiet = [0.002f32; FRAME_SIZE];
        gate.process(&mut quiet);
        assert!(quiet.iter().all(|s| s.abs() < 1e-4));
    }

    #[test]
    fn test_gate_threshold_is_adjustable() {
        let mut gate = NoiseGate::new(GATE_THRESHOLD_DB, GATE_HYSTERESIS_DB);
        gate.set_threshold_db(-60.0);
        assert_eq!(gate.threshold_db(), -60.0);
        for frame in sine_frames(440.0, 0.003, 10) {
            let mut out = frame;
            gate.process(&mut out);
        }
        assert!(gate.is_open());
    }

    // ── Compressor ───────────────────────────────────────────────

    #[test]
    fn test_compressor_makeup_only_below_threshold() {
        let mut comp = Compressor::new(COMPRESSOR_THRESHOLD_DB, COMPRESSOR_RATIO);
        assert_abs_diff_eq!(comp.makeup_gain(), 2.15443, epsilon = 1e-3);

        let mut frame = [0.01f32; FRAME_SIZE];
        for _ in 0..100 {
            frame.fill(0.01);
            comp.process(&mut frame);
        }
        assert_abs_diff_eq!(frame[FRAME_SIZE - 1], 0.01 * comp.makeup_gain(), epsilon = 1e-5);
    }

    #[test]
    fn test_compressor_reduces_loud_level() {
        let mut comp = Compressor::new(COMPRESSOR_THRESHOLD_DB, COMPRESSOR_RATIO);
        let mut frame = [0.9f32; FRAME_SIZE];
        for _ in 0..100 {
            frame.fill(0.9);
            comp.process(&mut frame);
        }
        // 0.9 is -0.9 dB: 3:1 above -20 dB gives -12.7 dB, then +6.7 dB makeup
        assert_abs_diff_eq!(frame[FRAME_SIZE - 1], 0.448, epsilon = 0.005);
    }

    #[test]
    fn test_compressor_never_exceeds_full_scale() {
        let mut comp = Compressor::new(COMPRESSOR_THRESHOLD_DB, COMPRESSOR_RATIO);
        // Transient before the envelope has caught up
        let mut frame = [0.95f32; FRAME_SIZE];
        comp.process(&mut frame);
        assert!(frame.iter().all(|s| s.abs() <= 1.0));
    }

    // ── DeEsser ──────────────────────────────────────────────────

    #[test]
    fn test_deesser_leaves_low_voice_alone() {
        let mut deesser = DeEsser::new().unwrap();
        for frame in sine_frames(200.0, 0.5, 20) {
            let mut out = frame;
            deesser.process(&mut out);
            assert_eq!(out, frame);
        }
    }

    #[test]
    fn test_deesser_cuts_loud_sibilance() {
        let mut deesser = DeEsser::new().unwrap();
        let frames = sine_frames(6500.0, 0.9, 20);
        let mut ratio = 1.0;
        for frame in &frames {
            let mut out = *frame;
            deesser.process(&mut out);
            ratio = rms(&out) / rms(frame);
        }
        assert!(ratio < 0.75, "sibilance should be reduced: {}", ratio);
        assert!(ratio >= DEESSER_MIN_GAIN - 1e-3);
    }

    // ── NoiseFloorTracker ────────────────────────────────────────

    #[test]
    fn test_initial_floor() {
        let tracker = NoiseFloorTracker::new();
        assert_abs_diff_eq!(tracker.floor(), 0.01, epsilon = 0.001);
    }

    #[test]
    fn test_floor_converges_to_constant_level() {
        let mut tracker = NoiseFloorTracker::new();
        for _ in 0..500 {
            tracker.update(0.05);
        }
        assert!(tracker.floor() > 0.04, "floor should converge: {}", tracker.floor());
    }

    #[test]
    fn test_floor_ignores_digital_silence() {
        let mut tracker = NoiseFloorTracker::new();
        for _ in 0..100 {
            tracker.update(0.03);
        }
        let before = tracker.floor();
        for _ in 0..50 {
            tracker.update(0.00001);
        }
        assert!(
            tracker.floor() >= before,
            "floor dragged down by silence: {} < {}",
            tracker.floor(),
            before
        );
    }

    #[test]
    fn test_floor_tracks_downward() {
        let mut tracker = NoiseFloorTracker::new();
        for _ in 0..100 {
            tracker.update(0.1);
        }
        let high = tracker.floor();
        for _ in 0..200 {
            tracker.update(0.005);
        }
        assert!(tracker.floor() < high);
    }

    #[test]
    fn test_gate_threshold_is_clamped() {
        let mut tracker = NoiseFloorTracker::new();
        for _ in 0..1000 {
            tracker.update(0.5);
        }
        assert_eq!(tracker.gate_threshold(), 0.08);

        let mut tracker = NoiseFloorTracker::new();
        for _ in 0..1000 {
            tracker.update(0.0002);
        }
        assert_eq!(tracker.gate_threshold(), 0.005);
    }
}
