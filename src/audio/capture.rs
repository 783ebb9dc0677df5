//! Audio sources and the capture loop that feeds the segment ring

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use super::level::LevelMonitor;
use super::resample::{to_pcm16, StreamResampler};
use super::ring::SegmentRing;
use crate::config::CaptureConfig;
use crate::error::{AudioError, RelayError, Result};

/// How long a device may stay silent before the read is failed
const DEVICE_TIMEOUT: Duration = Duration::from_secs(2);

/// Blocking source of mono PCM16 samples at the capture rate
pub trait AudioSource {
    /// Fill `segment` completely, returning the number of samples read.
    /// `AudioError::EndOfStream` signals a finite source ran out.
    fn read(&mut self, segment: &mut [i16]) -> Result<usize>;

    /// Release the underlying device
    fn close(&mut self) {}

    fn name(&self) -> &str;
}

/// State shared between the capture thread and the assembler
pub struct CaptureContext {
    ring: SegmentRing,
    level: LevelMonitor,
    sample_rate: u32,
}

impl CaptureContext {
    pub fn new(config: &CaptureConfig) -> Arc<Self> {
        info!(
            "Allocating ring of {} segments x {} samples",
            config.ring_segments, config.segment_samples
        );
        Arc::new(Self {
            ring: SegmentRing::new(config.segment_samples, config.ring_segments),
            level: LevelMonitor::new(config.level_alpha),
            sample_rate: config.sample_rate,
        })
    }

    pub fn ring(&self) -> &SegmentRing {
        &self.ring
    }

    pub fn level(&self) -> f64 {
        self.level.level()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn segment_samples(&self) -> usize {
        self.ring.segment_samples()
    }

    /// Raise the stop signal observed by both loops
    pub fn stop(&self) {
        self.ring.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.ring.is_stopped()
    }
}

/// Pull segments from `source` into the ring until stopped.
///
/// A read failure closes the source and raises stop; end of stream does the
/// same but is not an error. Returns the number of captured segments.
pub fn run_capture<S: AudioSource>(source: &mut S, context: &CaptureContext) -> Result<u64> {
    let mut segment = vec![0i16; context.segment_samples()];
    let mut captured = 0u64;

    let outcome = loop {
        if context.is_stopped() {
            break Ok(captured);
        }

        match source.read(&mut segment) {
            Ok(n) if n == segment.len() => {}
            Ok(n) => {
                break Err(AudioError::ShortRead {
                    got: n,
                    expected: segment.len(),
                }
                .into())
            }
            Err(RelayError::Audio(AudioError::EndOfStream)) => {
                info!("Audio source '{}' reached end of stream", source.name());
                break Ok(captured);
            }
            Err(e) => break Err(e),
        }

        captured = context.ring.publish(&segment);
        context.level.update(&segment);
        if captured % 100 == 0 {
            trace!("Captured {} segments level={:.1}", captured, context.level());
        }
    };

    if let Err(ref e) = outcome {
        error!("Capture from '{}' failed: {}", source.name(), e);
    }
    source.close();
    context.stop();
    outcome
}

/// Start the capture thread. The source is opened on that thread because
/// device streams may not be sendable.
pub fn spawn_capture<S, F>(context: Arc<CaptureContext>, open: F) -> Result<JoinHandle<Result<u64>>>
where
    S: AudioSource,
    F: FnOnce() -> Result<S> + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("capture".into())
        .spawn(move || {
            let mut source = match open() {
                Ok(source) => source,
                Err(e) => {
                    error!("Cannot open audio source: {}", e);
                    context.stop();
                    return Err(e);
                }
            };
            info!("Capturing from '{}'", source.name());
            run_capture(&mut source, &context)
        })?;
    Ok(handle)
}

/// Microphone input through cpal, down-mixed to mono and resampled to the
/// capture rate when the device cannot run at it
pub struct CpalSource {
    name: String,
    stream: Option<Stream>,
    receiver: Receiver<Vec<f32>>,
    resampler: Option<StreamResampler>,
    pending: Vec<i16>,
}

impl CpalSource {
    /// Open `device` (substring match, `None` = default input) and start it
    pub fn open(device: Option<&str>, sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = match device {
            Some(name) => find_device_by_name(&host, name)?,
            None => host.default_input_device().ok_or(AudioError::NoInputDevice)?,
        };
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio input device: {}", name);

        let (config, actual_rate) = select_config(&device, sample_rate)?;
        let channels = config.channels as usize;

        let resampler = if actual_rate != sample_rate {
            Some(StreamResampler::new(actual_rate, sample_rate)?)
        } else {
            None
        };

        let (sender, receiver) = bounded(100);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = if channels > 1 {
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                            .collect()
                    } else {
                        data.to_vec()
                    };

                    if sender.try_send(samples).is_err() {
                        warn!("Audio device queue overflow - dropping samples");
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;

        Ok(Self {
            name,
            stream: Some(stream),
            receiver,
            resampler,
            pending: Vec::new(),
        })
    }

    /// Names of the available input devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;

        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

impl AudioSource for CpalSource {
    fn read(&mut self, segment: &mut [i16]) -> Result<usize> {
        while self.pending.len() < segment.len() {
            let chunk = match self.receiver.recv_timeout(DEVICE_TIMEOUT) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(AudioError::Read(format!(
                        "no audio for {:?}",
                        DEVICE_TIMEOUT
                    ))
                    .into())
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(AudioError::Read("audio stream closed".to_string()).into())
                }
            };

            let chunk = match self.resampler {
                Some(ref mut resampler) => resampler.process(&chunk)?,
                None => chunk,
            };
            self.pending.extend(chunk.into_iter().map(to_pcm16));
        }

        segment.copy_from_slice(&self.pending[..segment.len()]);
        self.pending.drain(..segment.len());
        Ok(segment.len())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("Audio device '{}' closed", self.name);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn find_device_by_name(host: &cpal::Host, name: &str) -> Result<Device> {
    let devices: Vec<Device> = host
        .input_devices()
        .map_err(|e| AudioError::DeviceConfig(e.to_string()))?
        .collect();
    let names: Vec<String> = devices
        .iter()
        .map(|d| d.name().unwrap_or_default())
        .collect();

    match_device_name(&names, name)
        .and_then(|idx| devices.into_iter().nth(idx))
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()).into())
}

/// Index of the device called exactly `wanted`, else of the first one
/// whose name contains it
fn match_device_name(names: &[String], wanted: &str) -> Option<usize> {
    names
        .iter()
        .position(|n| n == wanted)
        .or_else(|| names.iter().position(|n| n.contains(wanted)))
}

/// Prefer a mono config at the requested rate, else the device's best rate
fn select_config(device: &Device, sample_rate: u32) -> Result<(StreamConfig, u32)> {
    let supported_configs = device
        .supported_input_configs()
        .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;

    let target_rate = SampleRate(sample_rate);
    let mut best = None;
    for cfg in supported_configs {
        debug!(
            "Supported config: channels={}, sample_rate={:?}-{:?}",
            cfg.channels(),
            cfg.min_sample_rate(),
            cfg.max_sample_rate()
        );

        let in_range = cfg.min_sample_rate() <= target_rate && target_rate <= cfg.max_sample_rate();
        if cfg.channels() == 1 && in_range {
            best = Some(cfg.with_sample_rate(target_rate));
            break;
        }
        if best.is_none() {
            best = Some(if in_range {
                cfg.with_sample_rate(target_rate)
            } else {
                cfg.with_max_sample_rate()
            });
        }
    }

    let supported = best.ok_or_else(|| {
        AudioError::DeviceConfig("No suitable audio configuration found".to_string())
    })?;
    let actual_rate = supported.sample_rate().0;
    info!(
        "Audio config: {} channels @ {} Hz (target: {} Hz)",
        supported.channels(),
        actual_rate,
        sample_rate
    );

    Ok((supported.config(), actual_rate))
}

/// WAV file played back as if it were a device
pub struct WavSource {
    name: String,
    samples: Vec<i16>,
    position: usize,
    /// Pace reads at the capture rate instead of delivering at once
    realtime: Option<(Instant, u32)>,
}

impl WavSource {
    /// Load `path`, down-mixing and resampling to `sample_rate`
    pub fn open(path: &Path, sample_rate: u32, realtime: bool) -> Result<Self> {
        let mut reader = hound::WavReader::open(path).map_err(|e| AudioError::Wav(e.to_string()))?;
        let spec = reader.spec();
        info!(
            "WAV format: {} channels, {} Hz, {} bits",
            spec.channels, spec.sample_rate, spec.bits_per_sample
        );

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| AudioError::Wav(e.to_string()))?,
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / max_val))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| AudioError::Wav(e.to_string()))?
            }
        };

        let channels = spec.channels.max(1) as usize;
        let mono: Vec<f32> = if channels > 1 {
            samples
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        } else {
            samples
        };

        let mono = if spec.sample_rate != sample_rate {
            let mut resampler = StreamResampler::new(spec.sample_rate, sample_rate)?;
            let mut out = resampler.process(&mono)?;
            out.extend(resampler.flush()?);
            out
        } else {
            mono
        };

        Ok(Self {
            name: path.display().to_string(),
            samples: mono.into_iter().map(to_pcm16).collect(),
            position: 0,
            realtime: realtime.then(|| (Instant::now(), sample_rate)),
        })
    }

    /// Total samples available
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl AudioSource for WavSource {
    fn read(&mut self, segment: &mut [i16]) -> Result<usize> {
        let end = self.position + segment.len();
        if end > self.samples.len() {
            return Err(AudioError::EndOfStream.into());
        }

        if let Some((started, rate)) = self.realtime {
            let due = started + Duration::from_secs_f64(end as f64 / f64::from(rate));
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }

        segment.copy_from_slice(&self.samples[self.position..end]);
        self.position = end;
        Ok(segment.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_exact_device_name_wins() {
        let devices = names(&["sysdefault:CARD=PCH", "default", "hw:CARD=PCH,DEV=0"]);
        assert_eq!(match_device_name(&devices, "default"), Some(1));
    }

    #[test]
    fn test_device_substring_fallback() {
        let devices = names(&["sysdefault:CARD=PCH", "hw:CARD=USB,DEV=0"]);
        assert_eq!(match_device_name(&devices, "USB"), Some(1));
        assert_eq!(match_device_name(&devices, "default"), Some(0));
        assert_eq!(match_device_name(&devices, "missing"), None);
    }
}
