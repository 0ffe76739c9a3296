//! Adapter between the floating-point pipeline and the fixed-point engine.
//!
//! Frames go out as 16-bit samples (clamped, scaled by 32767) and come back
//! scaled by 1/32768. Anything that makes the engine unusable for a frame
//! leaves the frame as it was.

use crate::engine::{EngineError, NoiseEngine, StreamConfig};
use std::sync::Arc;

const ENCODE_SCALE: f32 = 32767.0;
const DECODE_SCALE: f32 = 32768.0;

// Engine errors are logged on the first occurrence and then every Nth
const ERROR_LOG_INTERVAL: u64 = 500;

/// Converts a normalized sample to 16-bit, clamping to [-1.0, 1.0] first.
///
/// Rounds away from zero so that decoding with the larger scale stays within
/// one step of the input.
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    let scaled = sample.clamp(-1.0, 1.0) * ENCODE_SCALE;
    if scaled < 0.0 {
        scaled.floor() as i16
    } else {
        scaled.ceil() as i16
    }
}

/// Converts a 16-bit sample back to the normalized range.
#[inline]
pub fn sample_from_i16(sample: i16) -> f32 {
    sample as f32 / DECODE_SCALE
}

/// What happened to a frame passed to [`NoiseSuppressor::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The engine output replaced the frame.
    Processed,
    /// No engine, or the frame was the wrong size. Frame untouched.
    PassThrough,
    /// The engine returned this status code. Frame untouched.
    EngineError(i32),
}

pub struct NoiseSuppressor {
    engine: Option<Arc<dyn NoiseEngine>>,
    stream: StreamConfig,
    frame_size: usize,
    input: Vec<i16>,
    output: Vec<i16>,
    render: Vec<i16>,
    errors: u64,
}

impl NoiseSuppressor {
    pub fn new(engine: Option<Arc<dyn NoiseEngine>>, frame_size: usize, stream: StreamConfig) -> Self {
        Self {
            engine,
            stream,
            frame_size,
            input: vec![0; frame_size],
            output: vec![0; frame_size],
            render: vec![0; frame_size],
            errors: 0,
        }
    }

    /// Pass-through adapter with no engine attached.
    pub fn passthrough(frame_size: usize, stream: StreamConfig) -> Self {
        Self::new(None, frame_size, stream)
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Runs one frame through the engine in place.
    pub fn process(&mut self, frame: &mut [f32]) -> Outcome {
        let engine = match &self.engine {
            Some(engine) if frame.len() == self.frame_size => engine,
            _ => return Outcome::PassThrough,
        };

        for (dst, &src) in self.input.iter_mut().zip(frame.iter()) {
            *dst = sample_to_i16(src);
        }

        if let Err(e) = engine.process_stream(&self.input, &self.stream, &self.stream, &mut self.output) {
            self.log_error("process_stream", &e);
            return Outcome::EngineError(e.code());
        }

        for (dst, &src) in frame.iter_mut().zip(self.output.iter()) {
            *dst = sample_from_i16(src);
        }
        Outcome::Processed
    }

    /// Hands one frame of speaker output to the engine's reverse stream.
    ///
    /// Failures are logged and otherwise ignored.
    pub fn feed_reference(&mut self, render: &[f32]) {
        let Some(engine) = &self.engine else {
            return;
        };
        if render.len() != self.frame_size {
            return;
        }

        for (dst, &src) in self.render.iter_mut().zip(render) {
            *dst = sample_to_i16(src);
        }
        if let Err(e) = engine.analyze_reverse_stream(&self.render, &self.stream) {
            self.log_error("analyze_reverse_stream", &e);
        }
    }

    fn log_error(&mut self, call: &str, e: &EngineError) {
        if self.errors % ERROR_LOG_INTERVAL == 0 {
            log::warn!(
                "Engine {} failed with code {} ({}), passing audio through [{} errors so far]",
                call,
                e.code(),
                e,
                self.errors + 1
            );
        }
        self.errors += 1;
    }
}
