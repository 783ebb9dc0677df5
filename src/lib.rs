//! Streaming speech recognition server and microphone batch decoder
//!
//! Clients connect over TCP, push PCM16 audio in length-prefixed frames and
//! get partial and final hypotheses back. A companion tool captures audio
//! into a segment ring and decodes it in fixed-length windows.
//!
//! # Architecture
//!
//! - `protocol`: frame codec, utterance state machine and the session loop
//! - `decoder`: decoding engine contract, working set, grammar loading, Whisper backend
//! - `server`: worker pool handing accepted connections to sessions
//! - `audio`: capture sources, segment ring, level monitor, utterance assembler
//! - `config`: configuration structures
//! - `error`: error types
//!
//! # Example
//!
//! ```no_run
//! use asr_relay::{load_working_set, Config, Server, WhisperDecoder};
//! use std::path::PathBuf;
//!
//! let config = Config::default();
//! let grammars = vec![PathBuf::from("models/ggml-base.en.bin")];
//!
//! let decoder_config = config.decoder.clone();
//! let server = Server::bind(&config.server, 9999).unwrap();
//! server
//!     .serve(move || {
//!         let mut decoder = WhisperDecoder::new(decoder_config.clone())?;
//!         load_working_set(&mut decoder, &grammars)?;
//!         Ok(decoder)
//!     })
//!     .unwrap();
//! ```

pub mod audio;
pub mod config;
pub mod decoder;
pub mod error;
pub mod protocol;
pub mod server;

// Re-exports for convenience
pub use audio::{CaptureContext, SegmentRing, UtteranceAssembler};
pub use config::{AssemblerConfig, CaptureConfig, Config, DecoderConfig, ServerConfig};
pub use decoder::{load_working_set, Decoder, Hypothesis, WhisperDecoder, WorkingSet};
pub use error::{AudioError, ConfigError, DecoderError, ProtocolError, RelayError, Result};
pub use protocol::{Request, Response, Session, UtteranceMachine, UtteranceState};
pub use server::Server;
