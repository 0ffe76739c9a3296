//! Startup failures and the process exit codes they map to.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Failed to initialize audio subsystem: {0:#}")]
    Host(anyhow::Error),

    #[error("Failed to initialize capture device: {0:#}")]
    CaptureDevice(anyhow::Error),

    #[error("Failed to initialize playback device: {0:#}")]
    PlaybackDevice(anyhow::Error),

    #[error("Failed to start capture device: {0:#}")]
    CaptureStart(anyhow::Error),

    #[error("Failed to start playback device: {0:#}")]
    PlaybackStart(anyhow::Error),

    #[error("Failed to initialize noise suppression engine: {0:#}")]
    Engine(anyhow::Error),
}

impl StartupError {
    /// Distinct exit code per failing stage.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Host(_) => -1,
            Self::CaptureDevice(_) => -2,
            Self::PlaybackDevice(_) => -3,
            Self::CaptureStart(_) => -4,
            Self::PlaybackStart(_) => -5,
            Self::Engine(_) => -6,
        }
    }
}

/// Exit code for any error reaching `main`. Non-startup errors map to 1.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<StartupError>()
        .map(StartupError::exit_code)
        .unwrap_or(1)
}
