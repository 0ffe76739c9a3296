use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{bounded, Receiver};
use duplexmic_core::constants::{CHANNELS, FRAME_SIZE, SAMPLE_RATE};
use duplexmic_core::{NoiseEngine, PipelineConfig, Session, SuppressionLevel, VoiceEngine};
use std::io::BufRead;
use std::sync::Arc;
use std::thread;

mod audio;
mod config;
mod devices;
mod error;

use config::AppConfig;
use devices::DeviceSelector;
use error::StartupError;

#[derive(Parser)]
#[command(name = "duplexmic")]
#[command(about = "DuplexMic: live microphone to speaker loopback with noise suppression", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available audio devices
    List,
    /// Route the microphone to the speakers until Enter or Ctrl+C
    Run(RunArgs),
}

#[derive(Args, Default)]
struct RunArgs {
    /// Capture device: "default", an index from `list`, or a name
    #[arg(short, long)]
    input: Option<String>,
    /// Playback device: "default", an index from `list`, or a name
    #[arg(short, long)]
    output: Option<String>,
    /// Pass audio through without an engine
    #[arg(long)]
    no_suppression: bool,
    /// low, moderate, high or very_high
    #[arg(short, long)]
    level: Option<SuppressionLevel>,
    #[arg(long)]
    no_high_pass: bool,
    /// Keep content above 8 kHz
    #[arg(long)]
    no_low_pass: bool,
    #[arg(long)]
    no_gate: bool,
    /// Derive the gate threshold from the measured noise floor
    #[arg(long)]
    adaptive_gate: bool,
    /// 3:1 compression above -20 dBFS
    #[arg(long)]
    compressor: bool,
    #[arg(long)]
    de_esser: bool,
    #[arg(long)]
    voice_eq: bool,
    /// Cancel speaker echo using the playback signal as reference
    #[arg(long)]
    echo_cancel: bool,
    #[arg(long)]
    gain_control: bool,
    /// Accumulator overflow guard, in frames
    #[arg(long)]
    guard_frames: Option<usize>,
    /// Remember these settings for the next run
    #[arg(long)]
    save: bool,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::List) => list_devices(),
        Some(Commands::Run(args)) => run(args),
        None => run(RunArgs::default()),
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(error::exit_code_for(&e));
    }
}

fn list_devices() -> Result<()> {
    let host = audio::init_host()?;
    println!("Audio Host: {}", host.id().name());
    devices::print_devices(&host)?;
    Ok(())
}

fn apply_args(config: &mut AppConfig, args: &RunArgs) {
    if let Some(input) = &args.input {
        config.input = input.clone();
    }
    if let Some(output) = &args.output {
        config.output = output.clone();
    }
    if args.no_suppression {
        config.suppression_enabled = false;
    }
    if let Some(level) = args.level {
        config.engine.suppression_level = level;
    }
    if args.no_high_pass {
        config.engine.high_pass_filter = false;
    }
    if args.no_low_pass {
        config.engine.low_pass_filter = false;
    }
    if args.no_gate {
        config.engine.noise_gate = false;
    }
    if args.adaptive_gate {
        config.engine.adaptive_gate = true;
    }
    if args.compressor {
        config.engine.compressor = true;
    }
    if args.de_esser {
        config.engine.de_esser = true;
    }
    if args.voice_eq {
        config.engine.voice_eq = true;
    }
    if args.echo_cancel {
        config.engine.echo_cancellation = true;
    }
    if args.gain_control {
        config.engine.gain_control = true;
    }
    if let Some(guard) = args.guard_frames {
        config.guard_frames = guard;
    }
    if config.guard_frames == 0 {
        log::warn!("guard_frames must be at least 1, using 1");
        config.guard_frames = 1;
    }
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = AppConfig::load();
    apply_args(&mut config, &args);

    let host = audio::init_host()?;
    devices::print_devices(&host)?;

    let engine: Option<Arc<dyn NoiseEngine>> = if config.suppression_enabled {
        let engine = VoiceEngine::new(config.engine).map_err(StartupError::Engine)?;
        Some(Arc::new(engine))
    } else {
        log::info!("Noise suppression disabled, passing audio through");
        None
    };

    let pipeline = PipelineConfig {
        guard_frames: config.guard_frames,
        echo_reference: config.suppression_enabled && config.engine.echo_cancellation,
        ..PipelineConfig::default()
    };
    let session = Session::new(pipeline, engine);
    let stats = session.stats();

    let streams = audio::DuplexStreams::start(
        &host,
        &DeviceSelector::parse(&config.input),
        &DeviceSelector::parse(&config.output),
        session,
    )?;

    println!("\nInput:  {}", streams.input_name);
    println!("Output: {}", streams.output_name);
    println!(
        "Format: F32, {} channel(s), {} Hz, {} samples/frame",
        CHANNELS, SAMPLE_RATE, FRAME_SIZE
    );
    if config.suppression_enabled {
        let stages = &config.engine;
        println!(
            "Noise suppression: on ({}, echo cancellation {}, high-pass {}, low-pass {})",
            stages.suppression_level,
            on_off(stages.echo_cancellation),
            on_off(stages.high_pass_filter),
            on_off(stages.low_pass_filter)
        );
        println!(
            "Dynamics: gate {}{}, compressor {}, de-esser {}, voice EQ {}",
            on_off(stages.noise_gate),
            if stages.noise_gate && stages.adaptive_gate { " (adaptive)" } else { "" },
            on_off(stages.compressor),
            on_off(stages.de_esser),
            on_off(stages.voice_eq)
        );
    } else {
        println!("Noise suppression: off");
    }

    if args.save {
        match config.save() {
            Ok(path) => println!("Settings saved to {}", path.display()),
            Err(e) => log::warn!("Could not save settings: {:#}", e),
        }
    }

    println!("\nDuplexMic active. Press Enter or Ctrl+C to stop.");
    wait_for_stop()?;

    println!("\nShutting down...");
    streams.stop();

    let snapshot = stats.snapshot();
    println!(
        "Captured {} samples, played {} ({} underrun), {} frames processed, {} passed through, {} engine errors, {} dropped, {} trimmed",
        snapshot.samples_captured,
        snapshot.samples_played,
        snapshot.samples_underrun,
        snapshot.frames_processed,
        snapshot.frames_passed_through,
        snapshot.engine_errors,
        snapshot.samples_dropped,
        snapshot.samples_trimmed
    );
    if let Ok(json) = serde_json::to_string(&snapshot) {
        log::debug!("Session stats: {}", json);
    }
    println!("Done.");
    Ok(())
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Blocks until Ctrl+C or a line on stdin.
fn wait_for_stop() -> Result<()> {
    let (tx, rx) = bounded::<()>(1);

    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.try_send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    thread::Builder::new()
        .name("duplexmic-stdin".into())
        .spawn(move || {
            let mut line = String::new();
            // EOF means no terminal attached; leave shutdown to Ctrl+C
            if let Ok(n) = std::io::stdin().lock().read_line(&mut line) {
                if n > 0 {
                    let _ = tx.try_send(());
                }
            }
        })
        .context("Failed to spawn stdin watcher")?;

    wait_on(&rx);
    Ok(())
}

fn wait_on(rx: &Receiver<()>) {
    if rx.recv().is_err() {
        log::debug!("Stop channel closed");
    }
}
