//! Per-connection request loop and the utterance lifecycle it drives

use std::io::{Read, Write};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::frame::{pcm16_samples, read_request, write_response, Request, Response};
use crate::decoder::Decoder;
use crate::error::{DecoderError, ProtocolError};

/// Utterance lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceState {
    /// No utterance open in the decoder
    Idle,
    /// The decoder holds an open utterance
    Active,
}

/// Counters reported when a session ends
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub requests: u64,
    pub audio_bytes: u64,
    pub utterances: u64,
    pub hypotheses: u64,
    pub decode_errors: u64,
    start_time: Instant,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            requests: 0,
            audio_bytes: 0,
            utterances: 0,
            hypotheses: 0,
            decode_errors: 0,
            start_time: Instant::now(),
        }
    }

    pub fn log_summary(&self, peer: &str) {
        info!(
            "Session {} complete: {} requests, {} audio bytes, {} utterances, {} hypotheses, {} decode errors, duration: {:.1}s",
            peer,
            self.requests,
            self.audio_bytes,
            self.utterances,
            self.hypotheses,
            self.decode_errors,
            self.start_time.elapsed().as_secs_f32()
        );
    }
}

/// Utterance state machine over an exclusively owned decoder.
///
/// `uttid` is `Some` exactly while the decoder has an open utterance.
pub struct UtteranceMachine<D: Decoder> {
    decoder: D,
    uttid: Option<String>,
    stats: SessionStats,
}

impl<D: Decoder> UtteranceMachine<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            uttid: None,
            stats: SessionStats::new(),
        }
    }

    pub fn state(&self) -> UtteranceState {
        if self.uttid.is_some() {
            UtteranceState::Active
        } else {
            UtteranceState::Idle
        }
    }

    pub fn uttid(&self) -> Option<&str> {
        self.uttid.as_deref()
    }

    pub fn active_model(&self) -> Option<&str> {
        self.decoder.working_set().active_name()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn into_decoder(self) -> D {
        self.decoder
    }

    /// Apply one request. Engine failures are logged and answered with an
    /// empty response.
    pub fn handle(&mut self, request: Request) -> Response {
        self.stats.requests += 1;

        let response = match request {
            Request::Start => {
                debug!("START marker");
                Response::empty()
            }
            Request::Grammar(name) => {
                self.switch_grammar(&name);
                Response::empty()
            }
            Request::Data(payload) => {
                self.stats.audio_bytes += payload.len() as u64;
                self.feed(&payload)
            }
            Request::Finish => self.finish(),
            Request::Unknown { tag } => {
                warn!("Ignoring request with unknown tag {}", tag);
                Response::empty()
            }
        };

        if !response.is_empty() {
            self.stats.hypotheses += 1;
        }
        response
    }

    fn switch_grammar(&mut self, name: &str) {
        if self.uttid.take().is_some() {
            info!("Stopping running decode to switch grammars");
            if let Err(e) = self.decoder.end_utterance() {
                self.decode_error("Error ending utterance", &e);
            }
        }

        info!("Request to switch grammar to '{}'", name);
        if let Err(e) = self.decoder.working_set_mut().select(name) {
            warn!("Unable to select grammar: {}", e);
            return;
        }
        if let Err(e) = self.decoder.update_working_set() {
            self.decode_error("Unable to update working set", &e);
        }
    }

    fn feed(&mut self, payload: &[u8]) -> Response {
        let samples = pcm16_samples(payload);

        if samples.is_empty() {
            // Nothing to decode; an open utterance still reports its partial
            return match self.state() {
                UtteranceState::Idle => {
                    debug!("Empty DATA with no utterance open");
                    Response::empty()
                }
                UtteranceState::Active => self.query("Got hyp"),
            };
        }

        if self.uttid.is_none() {
            match self.decoder.start_utterance(None) {
                Ok(id) => {
                    debug!("Started utterance {}", id);
                    self.stats.utterances += 1;
                    self.uttid = Some(id);
                }
                Err(e) => {
                    self.decode_error("Error starting decoding", &e);
                    return Response::empty();
                }
            }
        }

        if let Err(e) = self.decoder.process_raw(&samples, false) {
            self.decode_error("Error decoding raw data", &e);
            return Response::empty();
        }

        self.query("Got hyp")
    }

    fn finish(&mut self) -> Response {
        let Some(uttid) = self.uttid.take() else {
            warn!("Cannot finalize when no utterance is active");
            return Response::empty();
        };

        info!("Finalizing utterance {} and getting end hypothesis", uttid);
        if let Err(e) = self.decoder.process_raw(&[], false) {
            self.decode_error("Error decoding raw data", &e);
        }
        if let Err(e) = self.decoder.end_utterance() {
            self.decode_error("Error ending processing", &e);
        }

        let response = self.query("Final hyp");
        if response.is_empty() {
            info!("No hypothesis made");
        }
        response
    }

    fn query(&mut self, label: &str) -> Response {
        match self.decoder.hypothesis() {
            Ok(Some(hyp)) if !hyp.text.is_empty() => {
                debug!("{}: {:05} {:010} '{}'", label, hyp.confidence(), hyp.score, hyp.text);
                Response::from_hypothesis(&hyp)
            }
            Ok(_) => Response::empty(),
            Err(e) => {
                self.decode_error("Error getting hypothesis", &e);
                Response::empty()
            }
        }
    }

    fn decode_error(&mut self, context: &str, err: &DecoderError) {
        self.stats.decode_errors += 1;
        warn!("{}: {}", context, err);
    }
}

/// One client connection: the stream, its decoder and the request loop
pub struct Session<S, D: Decoder> {
    stream: S,
    machine: UtteranceMachine<D>,
    max_frame: usize,
    peer: String,
}

impl<S: Read + Write, D: Decoder> Session<S, D> {
    pub fn new(stream: S, decoder: D, max_frame: usize) -> Self {
        Self {
            stream,
            machine: UtteranceMachine::new(decoder),
            max_frame,
            peer: "client".to_string(),
        }
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    /// Serve requests until the peer disconnects or a framing/I-O error
    /// occurs. The decoder and the stream are released on return.
    pub fn run(mut self) -> Result<SessionStats, ProtocolError> {
        let result = self.serve();

        let stats = self.machine.stats().clone();
        stats.log_summary(&self.peer);
        debug!("Freeing decoder for {}", self.peer);

        result.map(|()| stats)
    }

    fn serve(&mut self) -> Result<(), ProtocolError> {
        loop {
            let Some(request) = read_request(&mut self.stream, self.max_frame)? else {
                info!("Client {} disconnected", self.peer);
                return Ok(());
            };

            debug!("Got {} request from {}", request.name(), self.peer);
            let response = self.machine.handle(request);
            write_response(&mut self.stream, &response, self.max_frame)?;
        }
    }
}
