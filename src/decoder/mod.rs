//! Decoding engine contract, working set and grammar loading

pub mod grammar;
pub mod whisper;
pub mod working_set;

use std::path::Path;

use crate::error::DecoderError;

pub use grammar::{load_working_set, GRAMMAR_WEIGHT};
pub use whisper::WhisperDecoder;
pub use working_set::{GrammarEntry, WorkingSet};

/// Divisor applied to the raw engine score
pub const CONFIDENCE_SCALE: i64 = 30_000;
/// Upper bound of the confidence surrogate
pub const MAX_CONFIDENCE: i32 = 1000;

/// Best-guess transcription of the current or just-ended utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hypothesis {
    pub text: String,
    /// Raw engine score (log domain, usually negative)
    pub score: i32,
    pub uttid: String,
}

impl Hypothesis {
    pub fn confidence(&self) -> i32 {
        confidence(self.score)
    }
}

/// Map a raw engine score onto `[0, MAX_CONFIDENCE]`.
///
/// This is an ordering surrogate, not a probability.
pub fn confidence(raw_score: i32) -> i32 {
    let scaled = i64::from(raw_score).abs() / CONFIDENCE_SCALE;
    scaled.min(i64::from(MAX_CONFIDENCE)) as i32
}

/// Stateful recognition session.
///
/// A decoder holds at most one open utterance. Samples are 16 kHz mono
/// PCM16. The working set is edited through [`Decoder::working_set_mut`]
/// and only takes effect after [`Decoder::update_working_set`].
pub trait Decoder {
    /// Engine-specific handle of a loaded model
    type Model;

    /// Load a model file
    fn read_model(&self, path: &Path) -> Result<Self::Model, DecoderError>;

    /// Open an utterance, returning its id. `uttid` overrides the
    /// engine's own numbering.
    fn start_utterance(&mut self, uttid: Option<&str>) -> Result<String, DecoderError>;

    /// Feed samples to the open utterance. `full_utterance` marks a
    /// single call carrying the whole utterance.
    fn process_raw(&mut self, samples: &[i16], full_utterance: bool)
        -> Result<usize, DecoderError>;

    /// Close the open utterance
    fn end_utterance(&mut self) -> Result<(), DecoderError>;

    /// Current hypothesis: partial while an utterance is open, final after
    /// it ended. `None` when nothing was recognized.
    fn hypothesis(&mut self) -> Result<Option<Hypothesis>, DecoderError>;

    fn working_set(&self) -> &WorkingSet<Self::Model>;

    fn working_set_mut(&mut self) -> &mut WorkingSet<Self::Model>;

    /// Install the working set's active model for subsequent utterances
    fn update_working_set(&mut self) -> Result<(), DecoderError>;
}
