//! Smoothed loudness estimate of the captured signal

use std::sync::atomic::{AtomicU64, Ordering};

/// One smoothing step: `level += (|sample| - level) * alpha`
pub fn smooth(level: f64, sample: i16, alpha: f64) -> f64 {
    level + (f64::from(sample).abs() - level) * alpha
}

/// Exponentially averaged absolute sample magnitude.
///
/// Written by the capture thread only; any thread may read it. Diagnostic,
/// the decode path never consults it.
#[derive(Debug)]
pub struct LevelMonitor {
    alpha: f64,
    bits: AtomicU64,
}

impl LevelMonitor {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Fold a captured segment into the estimate
    pub fn update(&self, samples: &[i16]) {
        let level = samples
            .iter()
            .fold(self.level(), |level, &s| smooth(level, s, self.alpha));
        self.bits.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        assert_eq!(LevelMonitor::new(0.0001).level(), 0.0);
    }

    #[test]
    fn test_converges_towards_magnitude() {
        let monitor = LevelMonitor::new(0.01);
        let segment: Vec<i16> = (0..160).map(|i| if i % 2 == 0 { 1000 } else { -1000 }).collect();
        for _ in 0..100 {
            monitor.update(&segment);
        }
        assert!((monitor.level() - 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_single_step() {
        assert_eq!(smooth(0.0, -100, 0.5), 50.0);
        assert_eq!(smooth(50.0, 50, 0.5), 50.0);
        assert_eq!(smooth(0.0, i16::MIN, 1.0), 32768.0);
    }
}
