//! Biquad filter stages for the voice chain.

use crate::constants::SAMPLE_RATE;
use anyhow::{anyhow, Result};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

/// Butterworth Q used by the high and low cuts
pub const BUTTERWORTH_Q: f32 = 0.707;

/// One second-order section at the pipeline sample rate.
pub struct Filter {
    inner: DirectForm2Transposed<f32>,
}

impl Filter {
    fn build(kind: Type<f32>, freq_hz: f32, q: f32, name: &str) -> Result<Self> {
        let coeffs = Coefficients::<f32>::from_params(kind, SAMPLE_RATE.hz(), freq_hz.hz(), q)
            .map_err(|e| anyhow!("Failed to create {} filter at {} Hz: {:?}", name, freq_hz, e))?;
        Ok(Self {
            inner: DirectForm2Transposed::<f32>::new(coeffs),
        })
    }

    /// Strips DC and rumble below `cutoff_hz`.
    pub fn high_pass(cutoff_hz: f32) -> Result<Self> {
        Self::build(Type::HighPass, cutoff_hz, BUTTERWORTH_Q, "high-pass")
    }

    /// Removes hiss above `cutoff_hz`.
    pub fn low_pass(cutoff_hz: f32) -> Result<Self> {
        Self::build(Type::LowPass, cutoff_hz, BUTTERWORTH_Q, "low-pass")
    }

    pub fn band_pass(center_hz: f32, q: f32) -> Result<Self> {
        Self::build(Type::BandPass, center_hz, q, "band-pass")
    }

    pub fn peaking(center_hz: f32, gain_db: f32, q: f32) -> Result<Self> {
        Self::build(Type::PeakingEQ(gain_db), center_hz, q, "peaking")
    }

    #[inline]
    pub fn run(&mut self, sample: f32) -> f32 {
        self.inner.run(sample)
    }

    pub fn process(&mut self, frame: &mut [f32]) {
        for sample in frame.iter_mut() {
            *sample = self.inner.run(*sample);
        }
    }
}

/// Fixed voice EQ: presence lift at 3 kHz, mud cut at 250 Hz and a small
/// high-mid lift at 5 kHz.
pub struct VoiceEq {
    bands: [Filter; 3],
}

impl VoiceEq {
    pub fn new() -> Result<Self> {
        Ok(Self {
            bands: [
                Filter::peaking(3000.0, 2.0, 1.2)?,
                Filter::peaking(250.0, -1.5, 1.5)?,
                Filter::peaking(5000.0, 1.5, 1.0)?,
            ],
        })
    }

    pub fn process(&mut self, frame: &mut [f32]) {
        for band in self.bands.iter_mut() {
            band.process(frame);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::constants::FRAME_SIZE;
    use std::f32::consts::TAU;

    /// `frames` consecutive frames of a sine, phase continuous.
    pub(crate) fn sine_frames(freq_hz: f32, amplitude: f32, frames: usize) -> Vec<[f32; FRAME_SIZE]> {
        (0..frames)
            .map(|f| {
                let mut frame = [0.0f32; FRAME_SIZE];
                for (i, s) in frame.iter_mut().enumerate() {
                    let n = (f * FRAME_SIZE + i) as f32;
                    *s = amplitude * (TAU * freq_hz * n / SAMPLE_RATE as f32).sin();
                }
                frame
            })
            .collect()
    }

    pub(crate) fn rms(frame: &[f32]) -> f32 {
        (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
    }

    /// Output/input RMS ratio on the last of 20 frames.
    fn settled_gain(mut stage: impl FnMut(&mut [f32]), freq_hz: f32) -> f32 {
        let frames = sine_frames(freq_hz, 0.5, 20);
        let mut ratio = 0.0;
        for frame in &frames {
            let mut out = *frame;
            stage(&mut out[..]);
            ratio = rms(&out) / rms(frame);
        }
        ratio
    }

    #[test]
    fn test_high_pass_removes_dc() {
        let mut hpf = Filter::high_pass(80.0).unwrap();
        let mut frame = [0.5f32; FRAME_SIZE];
        for _ in 0..20 {
            frame.fill(0.5);
            hpf.process(&mut frame);
        }
        assert!(
            frame[FRAME_SIZE - 1].abs() < 0.01,
            "DC should be filtered out: got {}",
            frame[FRAME_SIZE - 1]
        );
    }

    #[test]
    fn test_low_pass_keeps_voice_and_cuts_hiss() {
        let mut lpf = Filter::low_pass(8000.0).unwrap();
        let voice = settled_gain(|f| lpf.process(f), 1000.0);
        assert!((voice - 1.0).abs() < 0.05, "1 kHz should pass: gain={}", voice);

        let mut lpf = Filter::low_pass(8000.0).unwrap();
        let hiss = settled_gain(|f| lpf.process(f), 20000.0);
        assert!(hiss < 0.2, "20 kHz should be cut: gain={}", hiss);
    }

    #[test]
    fn test_band_pass_rejects_far_tones() {
        let mut bpf = Filter::band_pass(6500.0, 2.0).unwrap();
        let far = settled_gain(|f| bpf.process(f), 200.0);
        assert!(far < 0.1, "200 Hz should be rejected: gain={}", far);
    }

    #[test]
    fn test_voice_eq_lifts_presence_and_cuts_mud() {
        let mut eq = VoiceEq::new().unwrap();
        let presence = settled_gain(|f| eq.process(f), 3000.0);
        assert!(presence > 1.1, "3 kHz should be lifted: gain={}", presence);

        let mut eq = VoiceEq::new().unwrap();
        let mud = settled_gain(|f| eq.process(f), 250.0);
        assert!(mud < 0.95, "250 Hz should be cut: gain={}", mud);
    }

    #[test]
    fn test_invalid_cutoff_is_an_error() {
        // Above Nyquist
        assert!(Filter::low_pass(30000.0).is_err());
    }
}
