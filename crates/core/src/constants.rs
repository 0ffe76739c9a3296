//! Shared constants for the duplexmic pipeline.

/// Sample rate used by both devices and the engine (48kHz)
pub const SAMPLE_RATE: u32 = 48000;

/// Mono everywhere
pub const CHANNELS: u16 = 1;

/// Processing frame size in samples (10ms at 48kHz = 480 samples)
pub const FRAME_SIZE: usize = 480;

/// Ring buffer capacity between capture and playback (2s)
pub const RING_CAPACITY: usize = SAMPLE_RATE as usize * 2;

/// Accumulator remainder, in frames, above which the overflow guard trims
pub const GUARD_FRAMES: usize = 2;
