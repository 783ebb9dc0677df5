//! Audio capture, the segment ring and batch utterance assembly

pub mod assembler;
pub mod capture;
pub mod level;
pub mod resample;
pub mod ring;

pub use assembler::{AssemblerSummary, UtteranceAssembler, UtteranceResult};
pub use capture::{run_capture, spawn_capture, AudioSource, CaptureContext, CpalSource, WavSource};
pub use level::LevelMonitor;
pub use resample::StreamResampler;
pub use ring::{RingReader, SegmentRing};
