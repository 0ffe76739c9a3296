//! Boundary to the voice-processing engine.
//!
//! The engine works on 16-bit fixed-point frames described by a pair of
//! [`StreamConfig`]s. Status codes follow the WebRTC audio processing module
//! convention: 0 is success, negative values are errors.

use crate::constants::{CHANNELS, SAMPLE_RATE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sample rate and channel count of one side of a processing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamConfig {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Samples in a 10ms frame across all channels.
    pub fn frame_len(&self) -> usize {
        (self.sample_rate / 100) as usize * self.channels as usize
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(SAMPLE_RATE, CHANNELS)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unspecified engine failure: {0}")]
    Unspecified(String),

    #[error("unsupported channel count: {0}")]
    BadNumberChannels(u16),

    #[error("unsupported sample rate: {0} Hz")]
    BadSampleRate(u32),

    #[error("bad frame length: expected {expected} samples, got {actual}")]
    BadDataLength { expected: usize, actual: usize },

    #[error("input and output stream configs differ")]
    StreamParameterMismatch,
}

impl EngineError {
    /// Non-zero status code reported for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Unspecified(_) => -1,
            Self::BadNumberChannels(_) => -6,
            Self::BadSampleRate(_) => -7,
            Self::BadDataLength { .. } => -9,
            Self::StreamParameterMismatch => -11,
        }
    }
}

/// External noise-suppression stage.
///
/// Implementations keep their own adaptive state across calls and must be safe
/// to call through a shared handle.
pub trait NoiseEngine: Send + Sync {
    /// Processes one fixed-size frame from `input` into `output`.
    fn process_stream(
        &self,
        input: &[i16],
        input_config: &StreamConfig,
        output_config: &StreamConfig,
        output: &mut [i16],
    ) -> Result<(), EngineError>;

    /// Feeds one frame of the signal sent to the speaker, for echo cancellation.
    fn analyze_reverse_stream(
        &self,
        _render: &[i16],
        _config: &StreamConfig,
    ) -> Result<(), EngineError> {
        Ok(())
    }
}

/// How aggressively noise is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionLevel {
    Low,
    Moderate,
    #[default]
    High,
    VeryHigh,
}

impl SuppressionLevel {
    /// Wet/dry blend applied to the denoised signal.
    pub fn strength(self) -> f32 {
        match self {
            Self::Low => 0.5,
            Self::Moderate => 0.7,
            Self::High => 0.85,
            Self::VeryHigh => 1.0,
        }
    }
}

impl fmt::Display for SuppressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        };
        f.write_str(name)
    }
}

impl FromStr for SuppressionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "low" => Ok(Self::Low),
            "moderate" => Ok(Self::Moderate),
            "high" => Ok(Self::High),
            "very_high" | "veryhigh" => Ok(Self::VeryHigh),
            other => Err(format!("unknown suppression level '{}'", other)),
        }
    }
}

/// Applied once when the engine is created. Never changed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_true")]
    pub noise_suppression: bool,
    #[serde(default)]
    pub suppression_level: SuppressionLevel,
    #[serde(default)]
    pub echo_cancellation: bool,
    #[serde(default)]
    pub gain_control: bool,
    #[serde(default = "default_true")]
    pub high_pass_filter: bool,
    /// 8 kHz low-pass above the voice band
    #[serde(default = "default_true")]
    pub low_pass_filter: bool,
    /// Presence/mud EQ
    #[serde(default)]
    pub voice_eq: bool,
    #[serde(default)]
    pub de_esser: bool,
    /// -20 dB, 3:1 with makeup gain
    #[serde(default)]
    pub compressor: bool,
    /// -40 dB gate with 10 dB hysteresis
    #[serde(default = "default_true")]
    pub noise_gate: bool,
    /// Follow the measured noise floor instead of the fixed gate threshold
    #[serde(default)]
    pub adaptive_gate: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            noise_suppression: true,
            suppression_level: SuppressionLevel::default(),
            echo_cancellation: false,
            gain_control: false,
            high_pass_filter: true,
            low_pass_filter: true,
            voice_eq: false,
            de_esser: false,
            compressor: false,
            noise_gate: true,
            adaptive_gate: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_negative_and_distinct() {
        let errors = [
            EngineError::Unspecified("x".into()),
            EngineError::BadNumberChannels(2),
            EngineError::BadSampleRate(44100),
            EngineError::BadDataLength {
                expected: 480,
                actual: 10,
            },
            EngineError::StreamParameterMismatch,
        ];
        let mut codes: Vec<i32> = errors.iter().map(EngineError::code).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_default_stream_is_10ms_mono() {
        let stream = StreamConfig::default();
        assert_eq!(stream.sample_rate, 48000);
        assert_eq!(stream.channels, 1);
        assert_eq!(stream.frame_len(), 480);
    }

    #[test]
    fn test_default_engine_config() {
        let config = EngineConfig::default();
        assert!(config.noise_suppression);
        assert!(config.high_pass_filter);
        assert!(!config.echo_cancellation);
        assert!(!config.gain_control);
        assert!(config.low_pass_filter);
        assert!(config.noise_gate);
        assert!(!config.adaptive_gate);
        assert!(!config.compressor);
        assert!(!config.de_esser);
        assert!(!config.voice_eq);
        assert_eq!(config.suppression_level, SuppressionLevel::High);
    }

    #[test]
    fn test_engine_config_missing_stages_take_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"compressor":true,"noise_gate":false}"#).unwrap();
        assert!(config.compressor);
        assert!(!config.noise_gate);
        assert!(config.low_pass_filter);
        assert!(config.high_pass_filter);
    }

    #[test]
    fn test_suppression_level_parse() {
        assert_eq!("low".parse::<SuppressionLevel>(), Ok(SuppressionLevel::Low));
        assert_eq!("Very-High".parse::<SuppressionLevel>(), Ok(SuppressionLevel::VeryHigh));
        assert!("loud".parse::<SuppressionLevel>().is_err());
        for level in [
            SuppressionLevel::Low,
            SuppressionLevel::Moderate,
            SuppressionLevel::High,
            SuppressionLevel::VeryHigh,
        ] {
            assert_eq!(level.to_string().parse::<SuppressionLevel>(), Ok(level));
        }
    }
}
