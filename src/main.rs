//! Streaming speech recognition server

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use asr_relay::{load_working_set, Config, Server, WhisperDecoder};

/// Streaming speech recognition server
#[derive(Parser)]
#[command(name = "asr-relay")]
#[command(about = "Decode framed PCM16 audio from TCP clients", long_about = None)]
#[command(override_usage = "asr-relay LISTENPORT CONFIGFILE GRAMMARFILE GRAMMARFILE ...")]
struct Cli {
    /// TCP port to listen on
    port: Option<u16>,

    /// Configuration file path
    config: Option<PathBuf>,

    /// Model files loaded into every decoder's working set; the first one
    /// that loads is active initially
    grammars: Vec<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (Some(port), Some(config_path)) = (cli.port, cli.config) else {
        Cli::command().print_help()?;
        return Ok(());
    };

    // Setup logging - quiet by default, use -v for more
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Listening on port: {}", port);
    let server = Server::bind(&config.server, port).context("Failed to bind listener")?;

    let decoder_config = config.decoder.clone();
    let grammars = cli.grammars;
    server
        .serve(move || {
            let mut decoder = WhisperDecoder::new(decoder_config.clone())?;
            load_working_set(&mut decoder, &grammars)?;
            Ok(decoder)
        })
        .context("Server failed to start")?;

    Ok(())
}
