//! Capture → suppression → playback session.
//!
//! A [`Session`] owns every piece of shared state for one run: the ring
//! buffer, the frame accumulator, the engine handle and the stats. It is built
//! once at startup and then split into the two halves the device callbacks
//! drive.

use crate::accumulator::FrameAccumulator;
use crate::constants::{FRAME_SIZE, GUARD_FRAMES, RING_CAPACITY};
use crate::engine::{NoiseEngine, StreamConfig};
use crate::ring_buffer::{RingConsumer, RingProducer, SampleRing};
use crate::stats::PipelineStats;
use crate::suppressor::{NoiseSuppressor, Outcome};
use parking_lot::Mutex;
use std::sync::Arc;

// Render reference depth, in frames (100ms)
const REFERENCE_FRAMES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Ring buffer capacity in samples
    pub ring_capacity: usize,
    /// Processing frame size in samples
    pub frame_size: usize,
    /// Accumulator overflow guard threshold, in frames
    pub guard_frames: usize,
    pub stream: StreamConfig,
    /// Route playback output back to the engine as an echo reference
    pub echo_reference: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_capacity: RING_CAPACITY,
            frame_size: FRAME_SIZE,
            guard_frames: GUARD_FRAMES,
            stream: StreamConfig::default(),
            echo_reference: false,
        }
    }
}

pub struct Session {
    capture: CapturePath,
    playback: PlaybackPath,
    stats: Arc<PipelineStats>,
}

impl Session {
    /// Builds a session. With `engine` set to `None` every frame passes through
    /// untouched.
    pub fn new(config: PipelineConfig, engine: Option<Arc<dyn NoiseEngine>>) -> Self {
        let stats = Arc::new(PipelineStats::default());
        let (producer, consumer) = SampleRing::with_capacity(config.ring_capacity);

        let (reference_tx, reference_rx) = if config.echo_reference && engine.is_some() {
            let (tx, rx) = SampleRing::with_capacity(config.frame_size * REFERENCE_FRAMES);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let capture = CapturePath {
            state: Mutex::new(CaptureState {
                accumulator: FrameAccumulator::new(config.frame_size, config.guard_frames),
                suppressor: NoiseSuppressor::new(engine, config.frame_size, config.stream),
                producer,
                reference: reference_rx,
                frame: vec![0.0; config.frame_size],
                render: vec![0.0; config.frame_size],
            }),
            stats: Arc::clone(&stats),
        };
        let playback = PlaybackPath {
            consumer,
            reference: reference_tx,
            stats: Arc::clone(&stats),
        };

        Self {
            capture,
            playback,
            stats,
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Hands out the capture and playback halves.
    pub fn split(self) -> (CapturePath, PlaybackPath) {
        (self.capture, self.playback)
    }
}

struct CaptureState {
    accumulator: FrameAccumulator,
    suppressor: NoiseSuppressor,
    producer: RingProducer,
    reference: Option<RingConsumer>,
    frame: Vec<f32>,
    render: Vec<f32>,
}

/// Body of the capture callback.
pub struct CapturePath {
    state: Mutex<CaptureState>,
    stats: Arc<PipelineStats>,
}

impl CapturePath {
    /// Handles one burst from the input device.
    ///
    /// Push, drain, suppression, ring write and the overflow guard all run
    /// under a single lock on the capture state.
    pub fn on_capture(&self, burst: &[f32]) {
        let mut guard = self.state.lock();
        let CaptureState {
            accumulator,
            suppressor,
            producer,
            reference,
            frame,
            render,
        } = &mut *guard;

        self.stats.record_captured(burst.len());
        accumulator.push(burst);

        for chunk in accumulator.drain_frames() {
            frame.copy_from_slice(chunk);

            if let Some(reference) = reference.as_mut() {
                reference.read(render);
                suppressor.feed_reference(render);
            }

            match suppressor.process(frame) {
                Outcome::Processed => self.stats.record_processed(),
                Outcome::PassThrough => self.stats.record_passed_through(),
                Outcome::EngineError(_) => self.stats.record_engine_error(),
            }

            let written = producer.write(frame);
            self.stats.record_dropped(frame.len() - written);
        }

        let trimmed = accumulator.enforce_limit();
        if trimmed > 0 {
            self.stats.record_trimmed(trimmed);
            log::debug!("Capture burst overflowed accumulator, trimmed {} samples", trimmed);
        }
    }

    /// Samples waiting for a complete frame.
    pub fn pending(&self) -> usize {
        self.state.lock().accumulator.len()
    }

    pub fn has_engine(&self) -> bool {
        self.state.lock().suppressor.has_engine()
    }
}

/// Body of the playback callback.
pub struct PlaybackPath {
    consumer: RingConsumer,
    reference: Option<RingProducer>,
    stats: Arc<PipelineStats>,
}

impl PlaybackPath {
    /// Fills `out` for the output device, padding with silence on underrun.
    ///
    /// Returns the number of real samples delivered.
    pub fn on_playback(&mut self, out: &mut [f32]) -> usize {
        let real = self.consumer.read(out);
        self.stats.record_played(real, out.len() - real);

        if let Some(reference) = self.reference.as_mut() {
            reference.write(out);
        }
        real
    }

    /// Samples held in the ring buffer.
    pub fn buffered(&self) -> usize {
        self.consumer.occupied_len()
    }
}
