use crate::constants::{CHANNELS, FRAME_SIZE, SAMPLE_RATE};
use crate::dynamics::{
    linear_to_db, Compressor, DeEsser, NoiseFloorTracker, NoiseGate, COMPRESSOR_RATIO,
    COMPRESSOR_THRESHOLD_DB, GATE_HYSTERESIS_DB, GATE_THRESHOLD_DB,
};
use crate::echo_cancel::EchoCanceller;
use crate::engine::{EngineConfig, EngineError, NoiseEngine, StreamConfig};
use crate::filters::{Filter, VoiceEq};
use anyhow::{Context, Result};
use nnnoiseless::DenoiseState;
use parking_lot::Mutex;

// Rumble cutoff for the high-pass stage
const HIGH_PASS_HZ: f32 = 80.0;
// Upper edge of the voice band
const LOW_PASS_HZ: f32 = 8000.0;

// Gain control target RMS (approx -3dB)
const AGC_TARGET: f32 = 0.7;

// Internal fixed-point scale. Symmetric so a fully bypassed engine is lossless.
const I16_SCALE: f32 = 32768.0;

/// Simple lookahead limiter for automatic gain control.
pub struct LookaheadLimiter {
    pub target_level: f32,
    current_gain: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl LookaheadLimiter {
    pub fn new(target_level: f32) -> Self {
        Self {
            target_level,
            current_gain: 1.0,
            attack_coeff: 0.1,
            release_coeff: 0.005,
        }
    }

    pub fn process_frame(&mut self, frame: &mut [f32]) {
        if frame.is_empty() {
            return;
        }

        let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
        let rms = (sum_sq / frame.len() as f32).sqrt();

        if rms > 0.0001 {
            let error = self.target_level / rms;
            let target_gain = if error < 1.0 { error } else { error.min(3.0) };

            if target_gain < self.current_gain {
                self.current_gain += (target_gain - self.current_gain) * self.attack_coeff;
            } else {
                self.current_gain += (target_gain - self.current_gain) * self.release_coeff;
            }
        } else if self.current_gain > 1.0 {
            self.current_gain -= 0.001;
        }

        for sample in frame.iter_mut() {
            *sample = (*sample * self.current_gain).clamp(-0.99, 0.99);
        }
    }

    pub fn gain(&self) -> f32 {
        self.current_gain
    }
}

struct EngineState {
    work: [f32; FRAME_SIZE],
    render: [f32; FRAME_SIZE],
    denoise_in: [f32; FRAME_SIZE],
    denoise_out: [f32; FRAME_SIZE],
    high_pass: Option<Filter>,
    low_pass: Option<Filter>,
    echo_canceller: Option<EchoCanceller>,
    denoise: Option<Box<DenoiseState<'static>>>,
    voice_eq: Option<VoiceEq>,
    de_esser: Option<DeEsser>,
    compressor: Option<Compressor>,
    gate: Option<NoiseGate>,
    floor_tracker: Option<NoiseFloorTracker>,
    limiter: Option<LookaheadLimiter>,
}

// SAFETY: EngineState owns all of its DSP state (DenoiseState, VoipAec3) and
// is only ever touched through the engine's mutex, so at most one thread uses
// it at a time. It is never aliased outside that lock.
unsafe impl Send for EngineState {}

/// Voice-processing engine over 10ms mono frames at 48kHz.
///
/// Stage order: high-pass, low-pass, echo cancellation, RNNoise, voice EQ,
/// de-esser, compressor, noise gate, gain control. Each stage is switched by
/// its [`EngineConfig`] flag.
///
/// Configured once at construction. Adaptive state (noise model, echo path,
/// gain) carries over from frame to frame.
pub struct VoiceEngine {
    config: EngineConfig,
    stream: StreamConfig,
    state: Mutex<EngineState>,
}

impl VoiceEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let high_pass = if config.high_pass_filter {
            Some(Filter::high_pass(HIGH_PASS_HZ)?)
        } else {
            None
        };
        let low_pass = if config.low_pass_filter {
            Some(Filter::low_pass(LOW_PASS_HZ)?)
        } else {
            None
        };
        let voice_eq = if config.voice_eq {
            Some(VoiceEq::new()?)
        } else {
            None
        };
        let de_esser = if config.de_esser {
            Some(DeEsser::new()?)
        } else {
            None
        };
        let echo_canceller = if config.echo_cancellation {
            Some(EchoCanceller::new().context("Echo cancellation unavailable")?)
        } else {
            None
        };
        let denoise = config.noise_suppression.then(DenoiseState::new);
        let compressor = config
            .compressor
            .then(|| Compressor::new(COMPRESSOR_THRESHOLD_DB, COMPRESSOR_RATIO));
        let gate = config
            .noise_gate
            .then(|| NoiseGate::new(GATE_THRESHOLD_DB, GATE_HYSTERESIS_DB));
        let floor_tracker = (config.noise_gate && config.adaptive_gate).then(NoiseFloorTracker::new);
        let limiter = config
            .gain_control
            .then(|| LookaheadLimiter::new(AGC_TARGET));

        log::debug!("Voice engine configured: {:?}", config);

        Ok(Self {
            config,
            stream: StreamConfig::new(SAMPLE_RATE, CHANNELS),
            state: Mutex::new(EngineState {
                work: [0.0; FRAME_SIZE],
                render: [0.0; FRAME_SIZE],
                denoise_in: [0.0; FRAME_SIZE],
                denoise_out: [0.0; FRAME_SIZE],
                high_pass,
                low_pass,
                echo_canceller,
                denoise,
                voice_eq,
                de_esser,
                compressor,
                gate,
                floor_tracker,
                limiter,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The only stream layout this engine accepts.
    pub fn stream_config(&self) -> StreamConfig {
        self.stream
    }

    fn check_stream(&self, config: &StreamConfig) -> Result<(), EngineError> {
        if config.sample_rate != self.stream.sample_rate {
            return Err(EngineError::BadSampleRate(config.sample_rate));
        }
        if config.channels != self.stream.channels {
            return Err(EngineError::BadNumberChannels(config.channels));
        }
        Ok(())
    }

    fn check_len(len: usize) -> Result<(), EngineError> {
        if len != FRAME_SIZE {
            return Err(EngineError::BadDataLength {
                expected: FRAME_SIZE,
                actual: len,
            });
        }
        Ok(())
    }
}

fn rms(frame: &[f32]) -> f32 {
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

impl NoiseEngine for VoiceEngine {
    fn process_stream(
        &self,
        input: &[i16],
        input_config: &StreamConfig,
        output_config: &StreamConfig,
        output: &mut [i16],
    ) -> Result<(), EngineError> {
        if input_config != output_config {
            return Err(EngineError::StreamParameterMismatch);
        }
        self.check_stream(input_config)?;
        Self::check_len(input.len())?;
        Self::check_len(output.len())?;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        for (w, &s) in state.work.iter_mut().zip(input) {
            *w = s as f32 / I16_SCALE;
        }

        if let Some(high_pass) = state.high_pass.as_mut() {
            high_pass.process(&mut state.work);
        }
        if let Some(low_pass) = state.low_pass.as_mut() {
            low_pass.process(&mut state.work);
        }

        if let Some(aec) = state.echo_canceller.as_mut() {
            aec.process_frame(&mut state.work)?;
        }

        if let Some(denoise) = state.denoise.as_mut() {
            // RNNoise expects 16-bit range floats
            for (d, &w) in state.denoise_in.iter_mut().zip(&state.work) {
                *d = w * I16_SCALE;
            }
            denoise.process_frame(&mut state.denoise_out, &state.denoise_in);

            let strength = self.config.suppression_level.strength();
            for (w, &wet) in state.work.iter_mut().zip(&state.denoise_out) {
                *w = (*w).mul_add(1.0 - strength, (wet / I16_SCALE) * strength);
            }
        }

        if let Some(eq) = state.voice_eq.as_mut() {
            eq.process(&mut state.work);
        }
        if let Some(de_esser) = state.de_esser.as_mut() {
            de_esser.process(&mut state.work);
        }
        if let Some(compressor) = state.compressor.as_mut() {
            compressor.process(&mut state.work);
        }

        if let Some(gate) = state.gate.as_mut() {
            if let Some(tracker) = state.floor_tracker.as_mut() {
                tracker.update(rms(&state.work));
                gate.set_threshold_db(linear_to_db(tracker.gate_threshold()));
            }
            gate.process(&mut state.work);
        }

        if let Some(limiter) = state.limiter.as_mut() {
            limiter.process_frame(&mut state.work);
        }

        for (o, &w) in output.iter_mut().zip(&state.work) {
            *o = (w * I16_SCALE).round().clamp(-32768.0, 32767.0) as i16;
        }
        Ok(())
    }

    fn analyze_reverse_stream(
        &self,
        render: &[i16],
        config: &StreamConfig,
    ) -> Result<(), EngineError> {
        self.check_stream(config)?;
        Self::check_len(render.len())?;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(aec) = state.echo_canceller.as_mut() {
            for (r, &s) in state.render.iter_mut().zip(render) {
                *r = s as f32 / I16_SCALE;
            }
            aec.set_render(&state.render);
        }
        Ok(())
    }
}
