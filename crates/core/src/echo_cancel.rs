//! Acoustic echo cancellation stage of the voice engine.
//!
//! Uses the aec3 crate (Rust port of WebRTC AEC3). The render reference is
//! whatever the playback path last sent to the speaker.

use crate::constants::{FRAME_SIZE, SAMPLE_RATE};
use crate::engine::EngineError;
use aec3::voip::VoipAec3;
use anyhow::{anyhow, Result};

pub struct EchoCanceller {
    aec: VoipAec3,
    render: [f32; FRAME_SIZE],
    output_buffer: [f32; FRAME_SIZE], // Pre-allocated to avoid heap allocation
}

impl EchoCanceller {
    pub fn new() -> Result<Self> {
        let aec = VoipAec3::builder(SAMPLE_RATE as usize, 1, 1)
            .build()
            .map_err(|e| anyhow!("Failed to build AEC3: {:?}", e))?;
        Ok(Self {
            aec,
            render: [0.0; FRAME_SIZE],
            output_buffer: [0.0; FRAME_SIZE],
        })
    }

    /// Stores the most recent speaker frame. Shorter input is zero-padded.
    pub fn set_render(&mut self, render: &[f32]) {
        let len = render.len().min(FRAME_SIZE);
        self.render[..len].copy_from_slice(&render[..len]);
        self.render[len..].fill(0.0);
    }

    /// Removes the echo of the stored render frame from `frame` in place.
    ///
    /// On failure `frame` is left untouched.
    pub fn process_frame(&mut self, frame: &mut [f32; FRAME_SIZE]) -> Result<(), EngineError> {
        self.output_buffer.fill(0.0);

        // level_change = false: capture gain is fixed for the session
        self.aec
            .process(&frame[..], Some(&self.render[..]), false, &mut self.output_buffer)
            .map_err(|e| EngineError::Unspecified(format!("AEC error: {:?}", e)))?;

        frame.copy_from_slice(&self.output_buffer);
        Ok(())
    }
}
