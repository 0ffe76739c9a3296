use crate::devices::{self, DeviceSelector};
use crate::error::StartupError;
use anyhow::anyhow;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::Host;
use duplexmic_core::constants::{CHANNELS, SAMPLE_RATE};
use duplexmic_core::Session;
use log::{info, warn};

/// Connects to the platform's default audio host.
pub fn init_host() -> Result<Host, StartupError> {
    let host = cpal::host_from_id(cpal::default_host().id())
        .map_err(|e| StartupError::Host(anyhow!(e)))?;
    info!("Audio host: {}", host.id().name());
    Ok(host)
}

fn stream_config() -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: CHANNELS,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// The running capture and playback streams of one session.
///
/// Dropping it releases both devices, playback first.
pub struct DuplexStreams {
    output_stream: cpal::Stream,
    input_stream: cpal::Stream,
    pub input_name: String,
    pub output_name: String,
}

impl DuplexStreams {
    /// Opens both devices, wires the session's callbacks into them and starts
    /// capture, then playback.
    ///
    /// On failure anything already opened is released before returning.
    pub fn start(
        host: &Host,
        input: &DeviceSelector,
        output: &DeviceSelector,
        session: Session,
    ) -> Result<Self, StartupError> {
        let input_device = devices::find_input(host, input).map_err(StartupError::CaptureDevice)?;
        let input_name = input_device.name().unwrap_or_default();
        info!("Using input device: {}", input_name);

        let output_device =
            devices::find_output(host, output).map_err(StartupError::PlaybackDevice)?;
        let output_name = output_device.name().unwrap_or_default();
        info!("Using output device: {}", output_name);

        let config = stream_config();
        let (capture, mut playback) = session.split();

        let input_stream = input_device
            .build_input_stream(
                &config,
                move |data: &[f32], _| capture.on_capture(data),
                |err| warn!("Input error: {}", err),
                None,
            )
            .map_err(|e| StartupError::CaptureDevice(anyhow!(e)))?;

        let output_stream = output_device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    playback.on_playback(data);
                },
                |err| warn!("Output error: {}", err),
                None,
            )
            .map_err(|e| StartupError::PlaybackDevice(anyhow!(e)))?;

        input_stream
            .play()
            .map_err(|e| StartupError::CaptureStart(anyhow!(e)))?;
        if let Err(e) = output_stream.play() {
            if let Err(pause_err) = input_stream.pause() {
                warn!("Failed to stop capture after playback error: {}", pause_err);
            }
            return Err(StartupError::PlaybackStart(anyhow!(e)));
        }

        Ok(Self {
            output_stream,
            input_stream,
            input_name,
            output_name,
        })
    }

    /// Stops both devices and releases them.
    pub fn stop(self) {
        if let Err(e) = self.output_stream.pause() {
            warn!("Failed to stop playback stream: {}", e);
        }
        if let Err(e) = self.input_stream.pause() {
            warn!("Failed to stop capture stream: {}", e);
        }
        info!("Audio streams stopped");
    }
}
