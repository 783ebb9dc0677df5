//! Batch decoding of fixed-length windows read from the capture ring

use std::sync::Arc;
use tracing::{info, warn};

use super::capture::CaptureContext;
use crate::decoder::{Decoder, Hypothesis};
use crate::error::{DecoderError, Result};

/// Outcome of one decoded window
#[derive(Debug, Clone)]
pub struct UtteranceResult {
    pub uttid: String,
    pub hypothesis: Option<Hypothesis>,
    /// Samples decoded; shorter than a full window only at shutdown
    pub samples: usize,
    /// Level estimate when the window was complete
    pub level: f64,
}

/// Totals reported when the assembler stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerSummary {
    pub utterances: u64,
    pub recognized: u64,
    pub lost_segments: u64,
}

/// Consumer side of the capture ring: collects a window of segments and
/// runs one start/feed/end/query cycle on it
pub struct UtteranceAssembler<D: Decoder> {
    decoder: D,
    context: Arc<CaptureContext>,
    window_segments: usize,
    uttid: String,
}

impl<D: Decoder> UtteranceAssembler<D> {
    /// `uttid` names every decoded utterance (the capture device name)
    pub fn new(decoder: D, context: Arc<CaptureContext>, window_secs: u32, uttid: &str) -> Self {
        let window_samples = window_secs as usize * context.sample_rate() as usize;
        let window_segments = (window_samples / context.segment_samples()).max(1);

        Self {
            decoder,
            context,
            window_segments,
            uttid: uttid.to_string(),
        }
    }

    pub fn window_segments(&self) -> usize {
        self.window_segments
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Decode windows until capture stops. A partial window left at stop is
    /// decoded too. Engine failures to open or close an utterance end the
    /// loop with an error.
    pub fn run<F>(&mut self, mut on_result: F) -> Result<AssemblerSummary>
    where
        F: FnMut(&UtteranceResult),
    {
        let context = Arc::clone(&self.context);
        let segment_samples = context.segment_samples();
        let mut reader = context.ring().reader();
        let mut window = vec![0i16; self.window_segments * segment_samples];
        let mut summary = AssemblerSummary::default();

        loop {
            info!(
                "Getting {} segments of utterance... level={:.1}",
                self.window_segments,
                context.level()
            );

            let mut filled = 0;
            while filled < self.window_segments {
                let slot = &mut window[filled * segment_samples..(filled + 1) * segment_samples];
                if reader.read_into(slot).is_none() {
                    break;
                }
                filled += 1;
            }

            if filled == 0 {
                break;
            }
            let level = context.level();

            info!("Decoding the utterance...");
            let samples = &window[..filled * segment_samples];
            let hypothesis = self.decode_window(samples)?;

            summary.utterances += 1;
            if hypothesis.is_some() {
                summary.recognized += 1;
            }
            on_result(&UtteranceResult {
                uttid: self.uttid.clone(),
                hypothesis,
                samples: samples.len(),
                level,
            });

            if filled < self.window_segments {
                break;
            }
        }

        summary.lost_segments = reader.lost();
        if summary.lost_segments > 0 {
            warn!("{} segments were overwritten before decoding", summary.lost_segments);
        }
        info!(
            "Assembler stopped: {} utterances, {} recognized",
            summary.utterances, summary.recognized
        );
        Ok(summary)
    }

    fn decode_window(&mut self, samples: &[i16]) -> std::result::Result<Option<Hypothesis>, DecoderError> {
        self.decoder.start_utterance(Some(&self.uttid))?;

        if let Err(e) = self.decoder.process_raw(samples, true) {
            warn!("Error decoding raw data: {}", e);
        }

        self.decoder.end_utterance()?;

        match self.decoder.hypothesis() {
            Ok(hyp) => Ok(hyp.filter(|h| !h.text.is_empty())),
            Err(e) => {
                warn!("Error getting hypothesis: {}", e);
                Ok(None)
            }
        }
    }
}
