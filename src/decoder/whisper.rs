//! Whisper-backed decoder. Every model in the working set is a ggml file.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
};

use super::{Decoder, Hypothesis, WorkingSet};
use crate::config::DecoderConfig;
use crate::error::DecoderError;

/// Base of the log scale scores are reported in
const LOG_BASE: f64 = 1.0001;
/// Floor for token probabilities before taking the log
const MIN_TOKEN_P: f64 = 1e-10;

/// Convert a summed natural-log probability into a base-1.0001 score,
/// clamped to `[i32::MIN, 0]`
fn log_p_to_score(log_p: f64) -> i32 {
    (log_p / LOG_BASE.ln()).clamp(f64::from(i32::MIN), 0.0) as i32
}

/// How a hypothesis query on an open utterance is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartialQuery {
    /// Partials disabled or too little audio buffered
    Nothing,
    /// Not enough new audio since the last partial decode
    Cached,
    Decode,
}

/// `decoded_at` is the buffer length at the last partial decode, 0 if none.
/// A new partial needs `partial_min_samples` more audio than the last one.
fn partial_query(config: &DecoderConfig, buffered: usize, decoded_at: usize) -> PartialQuery {
    if !config.partial_results || buffered < config.partial_min_samples {
        PartialQuery::Nothing
    } else if buffered < decoded_at + config.partial_min_samples {
        PartialQuery::Cached
    } else {
        PartialQuery::Decode
    }
}

/// Whisper-based decoder with a swappable working set of models
pub struct WhisperDecoder {
    config: DecoderConfig,
    working_set: WorkingSet<Arc<WhisperContext>>,
    /// Inference state of the installed model, reused across decodes
    state: Option<WhisperState>,
    samples: Vec<f32>,
    uttid: Option<String>,
    open: bool,
    partial: Option<Hypothesis>,
    partial_at: usize,
    /// Final hypothesis of the last ended utterance, decoded on first query
    final_hyp: Option<Option<Hypothesis>>,
    next_uttid: u64,
}

impl WhisperDecoder {
    /// Create a decoder with an empty working set
    pub fn new(config: DecoderConfig) -> Result<Self, DecoderError> {
        if config.threads == 0 {
            return Err(DecoderError::Init("threads must be positive".to_string()));
        }

        Ok(Self {
            config,
            working_set: WorkingSet::new(),
            state: None,
            samples: Vec::new(),
            uttid: None,
            open: false,
            partial: None,
            partial_at: 0,
            final_hyp: None,
            next_uttid: 0,
        })
    }

    fn decode(&mut self) -> Result<Option<Hypothesis>, DecoderError> {
        let Some(uttid) = self.uttid.clone() else {
            return Ok(None);
        };
        if self.samples.is_empty() {
            return Ok(None);
        }

        let state = self.state.as_mut().ok_or(DecoderError::EmptyWorkingSet)?;
        let Some((text, log_p)) = transcribe(state, &self.config, &self.samples)? else {
            return Ok(None);
        };

        let score = log_p_to_score(log_p);
        debug!("Transcription complete: score={} chars={}", score, text.len());
        Ok(Some(Hypothesis { text, score, uttid }))
    }
}

/// Run one full pass over `samples`, returning the text and the summed
/// token log-probability
fn transcribe(
    state: &mut WhisperState,
    config: &DecoderConfig,
    samples: &[f32],
) -> Result<Option<(String, f64)>, DecoderError> {
    debug!(
        "Transcribing {} samples ({:.2}s)",
        samples.len(),
        samples.len() as f32 / 16000.0
    );

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_n_threads(config.threads as i32);
    params.set_language(Some(&config.language));
    params.set_translate(config.translate);
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_no_context(true);

    state
        .full(params, samples)
        .map_err(|e| DecoderError::Decode(e.to_string()))?;

    let num_segments = state
        .full_n_segments()
        .map_err(|e| DecoderError::Decode(e.to_string()))?;

    let mut text = String::new();
    let mut log_p = 0.0f64;
    for i in 0..num_segments {
        let segment = state
            .full_get_segment_text(i)
            .map_err(|e| DecoderError::Decode(e.to_string()))?;
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(segment.trim());

        let num_tokens = state
            .full_n_tokens(i)
            .map_err(|e| DecoderError::Decode(e.to_string()))?;
        for j in 0..num_tokens {
            let p = state
                .full_get_token_prob(i, j)
                .map_err(|e| DecoderError::Decode(e.to_string()))?;
            log_p += f64::from(p).max(MIN_TOKEN_P).ln();
        }
    }

    let text = text.trim().to_string();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some((text, log_p)))
}

impl Decoder for WhisperDecoder {
    type Model = Arc<WhisperContext>;

    fn read_model(&self, path: &Path) -> Result<Self::Model, DecoderError> {
        if !path.exists() {
            return Err(DecoderError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| DecoderError::ModelLoad {
            path: path.display().to_string(),
            reason: "path is not valid UTF-8".to_string(),
        })?;

        info!("Loading Whisper model from: {}", path.display());
        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| DecoderError::ModelLoad {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Arc::new(ctx))
    }

    fn start_utterance(&mut self, uttid: Option<&str>) -> Result<String, DecoderError> {
        if self.open {
            return Err(DecoderError::UtteranceActive);
        }
        if self.state.is_none() {
            return Err(DecoderError::EmptyWorkingSet);
        }

        let uttid = match uttid {
            Some(id) => id.to_string(),
            None => format!("{:09}", self.next_uttid),
        };
        self.next_uttid += 1;

        self.samples.clear();
        self.partial = None;
        self.partial_at = 0;
        self.final_hyp = None;
        self.uttid = Some(uttid.clone());
        self.open = true;
        Ok(uttid)
    }

    fn process_raw(
        &mut self,
        samples: &[i16],
        _full_utterance: bool,
    ) -> Result<usize, DecoderError> {
        if !self.open {
            return Err(DecoderError::NoUtterance);
        }
        self.samples
            .extend(samples.iter().map(|&s| f32::from(s) / 32768.0));
        Ok(samples.len())
    }

    fn end_utterance(&mut self) -> Result<(), DecoderError> {
        if !self.open {
            return Err(DecoderError::NoUtterance);
        }
        self.open = false;
        Ok(())
    }

    fn hypothesis(&mut self) -> Result<Option<Hypothesis>, DecoderError> {
        if self.open {
            return match partial_query(&self.config, self.samples.len(), self.partial_at) {
                PartialQuery::Nothing => Ok(None),
                PartialQuery::Cached => Ok(self.partial.clone()),
                PartialQuery::Decode => {
                    let hyp = self.decode()?;
                    self.partial = hyp.clone();
                    self.partial_at = self.samples.len();
                    Ok(hyp)
                }
            };
        }

        if let Some(ref cached) = self.final_hyp {
            return Ok(cached.clone());
        }
        let hyp = self.decode()?;
        self.samples.clear();
        self.final_hyp = Some(hyp.clone());
        Ok(hyp)
    }

    fn working_set(&self) -> &WorkingSet<Self::Model> {
        &self.working_set
    }

    fn working_set_mut(&mut self) -> &mut WorkingSet<Self::Model> {
        &mut self.working_set
    }

    fn update_working_set(&mut self) -> Result<(), DecoderError> {
        if self.open {
            return Err(DecoderError::UtteranceActive);
        }
        let active = self
            .working_set
            .active()
            .ok_or(DecoderError::EmptyWorkingSet)?;

        debug!("Installing model '{}'", active.name);
        let state = active
            .model
            .create_state()
            .map_err(|e| DecoderError::Whisper(e.to_string()))?;
        self.state = Some(state);
        Ok(())
    }
}
