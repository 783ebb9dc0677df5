//! Error types for the recognition server and the capture tool

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Decoder error: {0}")]
    Decoder(#[from] DecoderError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire protocol errors. Every variant ends the session it occurred in.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Frame length {len} exceeds buffer of {max} bytes")]
    Oversize { len: i32, max: usize },

    #[error("Negative frame length {0}")]
    NegativeLength(i32),

    #[error("Payload of {0} bytes does not fit a frame length field")]
    PayloadTooLarge(usize),

    #[error("Short read: {0}")]
    ShortRead(#[source] std::io::Error),

    #[error("Short write: {0}")]
    ShortWrite(#[source] std::io::Error),
}

/// Decoding engine errors
#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("Failed to initialize decoder: {0}")]
    Init(String),

    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to load model {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("No model named '{0}' in the working set")]
    UnknownModel(String),

    #[error("Working set has no usable model")]
    EmptyWorkingSet,

    #[error("An utterance is already in progress")]
    UtteranceActive,

    #[error("No utterance in progress")]
    NoUtterance,

    #[error("Decoding failed: {0}")]
    Decode(String),

    #[error("Whisper error: {0}")]
    Whisper(String),
}

/// Audio capture errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio input device available")]
    NoInputDevice,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device configuration: {0}")]
    DeviceConfig(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("Stream playback error: {0}")]
    StreamPlay(String),

    #[error("Resampling error: {0}")]
    Resampling(String),

    #[error("Read from audio interface failed: {0}")]
    Read(String),

    #[error("Short read from audio interface: got {got} samples, expected {expected}")]
    ShortRead { got: usize, expected: usize },

    #[error("WAV error: {0}")]
    Wav(String),

    #[error("End of audio stream")]
    EndOfStream,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },
}

pub type Result<T> = std::result::Result<T, RelayError>;
