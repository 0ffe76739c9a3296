pub mod accumulator;
pub mod constants;
pub mod dynamics;
pub mod echo_cancel;
pub mod engine;
pub mod filters;
pub mod pipeline;
pub mod processor;
pub mod ring_buffer;
pub mod stats;
pub mod suppressor;

pub use accumulator::FrameAccumulator;
pub use engine::{EngineConfig, EngineError, NoiseEngine, StreamConfig, SuppressionLevel};
pub use pipeline::{CapturePath, PipelineConfig, PlaybackPath, Session};
pub use processor::VoiceEngine;
pub use ring_buffer::{RingConsumer, RingProducer, SampleRing};
pub use stats::{PipelineStats, StatsSnapshot};
pub use suppressor::{NoiseSuppressor, Outcome};
