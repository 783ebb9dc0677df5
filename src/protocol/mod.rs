//! Framed request/response protocol and per-connection sessions

pub mod frame;
pub mod session;

pub use frame::{
    pcm16_bytes, pcm16_samples, read_request, read_response, write_response, Request,
    RequestTag, Response, ScoredText, DEFAULT_MAX_FRAME,
};
pub use session::{Session, SessionStats, UtteranceMachine, UtteranceState};
