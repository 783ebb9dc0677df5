//! Configuration structures for the server and the capture tool

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub decoder: DecoderConfig,
    pub capture: CaptureConfig,
    pub assembler: AssemblerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server or the capture loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_frame < 4 {
            return Err(invalid("server.max_frame", self.server.max_frame));
        }
        if self.server.workers == 0 {
            return Err(invalid("server.workers", self.server.workers));
        }
        if self.decoder.threads == 0 {
            return Err(invalid("decoder.threads", self.decoder.threads));
        }
        if self.capture.sample_rate == 0 {
            return Err(invalid("capture.sample_rate", self.capture.sample_rate));
        }
        if self.capture.segment_samples == 0 {
            return Err(invalid("capture.segment_samples", self.capture.segment_samples));
        }
        if self.capture.ring_segments == 0 {
            return Err(invalid("capture.ring_segments", self.capture.ring_segments));
        }
        if !(self.capture.level_alpha > 0.0 && self.capture.level_alpha <= 1.0) {
            return Err(invalid("capture.level_alpha", self.capture.level_alpha));
        }
        if self.assembler.window_secs == 0 {
            return Err(invalid("assembler.window_secs", self.assembler.window_secs));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Network server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind_address: String,
    /// Largest accepted request payload, also the response buffer size (bytes)
    pub max_frame: usize,
    /// Number of sessions served concurrently
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            max_frame: crate::protocol::DEFAULT_MAX_FRAME,
            workers: 4,
        }
    }
}

/// Decoding engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Language for transcription
    pub language: String,
    /// Number of threads for inference
    pub threads: u32,
    /// Enable translation to English
    pub translate: bool,
    /// Decode partial hypotheses while an utterance is open
    pub partial_results: bool,
    /// Minimum buffered samples before a partial hypothesis is decoded
    pub partial_min_samples: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            threads: 4,
            translate: false,
            partial_results: true,
            partial_min_samples: 8000,
        }
    }
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture sample rate (Hz)
    pub sample_rate: u32,
    /// Samples per ring buffer segment (160 = 10 ms at 16 kHz)
    pub segment_samples: usize,
    /// Number of segments held by the ring buffer
    pub ring_segments: usize,
    /// Smoothing factor of the level estimate
    pub level_alpha: f64,
    /// Audio device name (None = default device)
    pub device: Option<String>,
    /// Read audio from a WAV file instead of a device
    pub wav_input: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            segment_samples: 160,
            ring_segments: 100_000,
            level_alpha: 0.0001,
            device: None,
            wav_input: None,
        }
    }
}

/// Batch utterance assembler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Length of each decoded window (seconds)
    pub window_secs: u32,
    /// Model files loaded into the decoder's working set
    pub models: Vec<PathBuf>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            window_secs: 10,
            models: Vec::new(),
        }
    }
}
