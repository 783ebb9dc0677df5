//! Continuous microphone capture with batch decoding of fixed windows

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use asr_relay::audio::{spawn_capture, CpalSource, UtteranceResult, WavSource};
use asr_relay::{load_working_set, CaptureContext, Config, UtteranceAssembler, WhisperDecoder};

/// Microphone batch decoder
#[derive(Parser)]
#[command(name = "mic-decode")]
#[command(about = "Capture audio and decode it in fixed-length windows", long_about = None)]
struct Cli {
    /// Audio input device name (uses default if not specified)
    device: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model file; repeat to load several, the first one is active
    #[arg(short, long)]
    model: Vec<PathBuf>,

    /// Read audio from a WAV file instead of a device
    #[arg(long)]
    wav: Option<PathBuf>,

    /// List available audio input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging - quiet by default, use -v for more
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    if cli.list_devices {
        return list_devices();
    }

    let mut config = if let Some(ref config_path) = cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(device) = cli.device {
        config.capture.device = Some(device);
    }
    if let Some(wav) = cli.wav {
        config.capture.wav_input = Some(wav);
    }
    if !cli.model.is_empty() {
        config.assembler.models = cli.model;
    }

    run(config)
}

fn run(config: Config) -> Result<()> {
    if config.assembler.models.is_empty() {
        anyhow::bail!("No model configured; pass --model or set assembler.models");
    }

    let mut decoder =
        WhisperDecoder::new(config.decoder.clone()).context("Failed to initialize decoder")?;
    load_working_set(&mut decoder, &config.assembler.models)
        .context("Failed to install working set")?;

    let context = CaptureContext::new(&config.capture);

    let ctx = context.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        ctx.stop();
    })?;

    let capture = config.capture.clone();
    let device_name = capture.device.clone().unwrap_or_else(|| "default".to_string());
    let producer = match capture.wav_input.clone() {
        Some(path) => spawn_capture(context.clone(), move || {
            WavSource::open(&path, capture.sample_rate, true)
        })?,
        None => spawn_capture(context.clone(), move || {
            CpalSource::open(capture.device.as_deref(), capture.sample_rate)
        })?,
    };

    let mut assembler = UtteranceAssembler::new(
        decoder,
        context.clone(),
        config.assembler.window_secs,
        &device_name,
    );
    let result = assembler.run(print_result);

    context.stop();
    match producer.join() {
        Ok(Ok(segments)) => info!("Capture stopped after {} segments", segments),
        Ok(Err(e)) => warn!("Capture ended with error: {}", e),
        Err(_) => error!("Capture thread panicked"),
    }

    let summary = result.context("Decoding failed")?;
    info!(
        "Decoded {} utterances ({} recognized, {} segments lost)",
        summary.utterances, summary.recognized, summary.lost_segments
    );
    Ok(())
}

fn print_result(result: &UtteranceResult) {
    match result.hypothesis {
        Some(ref hyp) => println!("Utterance (score={}): {}", hyp.score, hyp.text),
        None => println!("Utterance not recognized."),
    }
}

fn list_devices() -> Result<()> {
    let devices = CpalSource::list_devices()?;

    if devices.is_empty() {
        println!("No audio input devices found");
    } else {
        println!("Available audio input devices:");
        for (i, name) in devices.iter().enumerate() {
            println!("  {}. {}", i + 1, name);
        }
    }

    Ok(())
}
