//! Streaming sample-rate conversion for devices that cannot capture at the
//! decoder's rate

use rubato::{FftFixedIn, Resampler};
use tracing::debug;

use crate::error::{AudioError, Result};

const CHUNK_FRAMES: usize = 1024;

/// Mono resampler that accepts arbitrary-sized chunks
pub struct StreamResampler {
    resampler: FftFixedIn<f32>,
    pending: Vec<f32>,
    source_rate: u64,
    target_rate: u64,
    consumed: u64,
    produced: u64,
}

impl StreamResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        debug!("Initializing resampler: {} Hz -> {} Hz", source_rate, target_rate);

        let resampler = FftFixedIn::<f32>::new(
            source_rate as usize,
            target_rate as usize,
            CHUNK_FRAMES,
            1,
            1,
        )
        .map_err(|e| AudioError::Resampling(e.to_string()))?;

        Ok(Self {
            resampler,
            pending: Vec::new(),
            source_rate: u64::from(source_rate),
            target_rate: u64::from(target_rate),
            consumed: 0,
            produced: 0,
        })
    }

    /// Resample what is available; leftover input waits for the next call
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut output = Vec::new();
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();

            let result = self
                .resampler
                .process(&[chunk], None)
                .map_err(|e| AudioError::Resampling(e.to_string()))?;

            self.consumed += needed as u64;
            if let Some(resampled) = result.into_iter().next() {
                self.produced += resampled.len() as u64;
                output.extend(resampled);
            }
        }

        Ok(output)
    }

    /// Resample whatever input is still pending, zero-padded to a full
    /// chunk. The output is cut so the total matches the input duration.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let tail = std::mem::take(&mut self.pending);
        self.consumed += tail.len() as u64;

        let result = self
            .resampler
            .process_partial(Some(&[tail][..]), None)
            .map_err(|e| AudioError::Resampling(e.to_string()))?;
        let mut output = result.into_iter().next().unwrap_or_default();

        let expected = (self.consumed * self.target_rate).div_ceil(self.source_rate);
        let room = expected.saturating_sub(self.produced) as usize;
        output.truncate(room);
        self.produced += output.len() as u64;
        Ok(output)
    }
}

/// Convert a float sample in `[-1, 1]` to PCM16, saturating
pub fn to_pcm16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_pcm16_saturates() {
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(1.5), i16::MAX);
        assert_eq!(to_pcm16(-1.0), i16::MIN);
        assert_eq!(to_pcm16(0.5), 16384);
    }

    #[test]
    fn test_downsample_ratio() {
        let mut resampler = StreamResampler::new(48000, 16000).unwrap();
        let input: Vec<f32> = (0..48000)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48000.0).sin() * 0.3)
            .collect();

        let mut output = Vec::new();
        for chunk in input.chunks(4800) {
            output.extend(resampler.process(chunk).unwrap());
        }

        // Buffered input may hold back up to one chunk
        assert!(output.len() > 15000 && output.len() <= 16000, "got {}", output.len());
    }

    #[test]
    fn test_flush_keeps_tail() {
        let mut resampler = StreamResampler::new(48000, 16000).unwrap();
        let input = vec![0.25f32; 48000 + 700];

        let mut output = resampler.process(&input).unwrap();
        let before = output.len();
        output.extend(resampler.flush().unwrap());

        assert!(output.len() > before);
        assert_eq!(output.len(), (48000 + 700) / 3 + 1);
        assert!(resampler.flush().unwrap().is_empty());
    }
}
