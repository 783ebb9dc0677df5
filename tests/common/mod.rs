//! Shared fixtures: a scripted decoder and an in-memory client stream

#![allow(dead_code)]

use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use asr_relay::{load_working_set, Decoder, DecoderError, Hypothesis, WorkingSet};

/// Engine calls in the order they were made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(Option<String>),
    Process { samples: usize, full: bool },
    End,
    Hypothesis,
    Update(String),
}

/// Decoder whose hypothesis describes what it was fed:
/// `"<model> heard <n> samples"`
pub struct FakeDecoder {
    pub calls: Arc<Mutex<Vec<Call>>>,
    working_set: WorkingSet<String>,
    installed: Option<String>,
    open: bool,
    uttid: Option<String>,
    samples: usize,
    next_uttid: u64,
    /// Report partial hypotheses while an utterance is open
    pub partial: bool,
    /// Fail every `process_raw` call
    pub fail_process: bool,
    pub score: i32,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            working_set: WorkingSet::new(),
            installed: None,
            open: false,
            uttid: None,
            samples: 0,
            next_uttid: 0,
            partial: false,
            fail_process: false,
            score: -3_000_000,
        }
    }

    /// Decoder with `names` loaded and the first one active
    pub fn with_grammars(names: &[&str]) -> Self {
        let mut decoder = Self::new();
        let paths: Vec<PathBuf> = names.iter().map(PathBuf::from).collect();
        load_working_set(&mut decoder, &paths).unwrap();
        decoder.calls.lock().unwrap().clear();
        decoder
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Decoder for FakeDecoder {
    type Model = String;

    fn read_model(&self, path: &Path) -> Result<String, DecoderError> {
        let name = path.to_string_lossy();
        if name.contains("missing") {
            return Err(DecoderError::ModelNotFound(name.into_owned()));
        }
        Ok(format!("lm:{}", name))
    }

    fn start_utterance(&mut self, uttid: Option<&str>) -> Result<String, DecoderError> {
        self.record(Call::Start(uttid.map(str::to_string)));
        if self.open {
            return Err(DecoderError::UtteranceActive);
        }
        if self.installed.is_none() {
            return Err(DecoderError::EmptyWorkingSet);
        }

        let id = uttid
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:09}", self.next_uttid));
        self.next_uttid += 1;
        self.open = true;
        self.samples = 0;
        self.uttid = Some(id.clone());
        Ok(id)
    }

    fn process_raw(&mut self, samples: &[i16], full: bool) -> Result<usize, DecoderError> {
        self.record(Call::Process {
            samples: samples.len(),
            full,
        });
        if !self.open {
            return Err(DecoderError::NoUtterance);
        }
        if self.fail_process {
            return Err(DecoderError::Decode("scripted failure".to_string()));
        }
        self.samples += samples.len();
        Ok(samples.len())
    }

    fn end_utterance(&mut self) -> Result<(), DecoderError> {
        self.record(Call::End);
        if !self.open {
            return Err(DecoderError::NoUtterance);
        }
        self.open = false;
        Ok(())
    }

    fn hypothesis(&mut self) -> Result<Option<Hypothesis>, DecoderError> {
        self.record(Call::Hypothesis);
        if (self.open && !self.partial) || self.samples == 0 {
            return Ok(None);
        }
        let (Some(model), Some(uttid)) = (self.installed.clone(), self.uttid.clone()) else {
            return Ok(None);
        };

        Ok(Some(Hypothesis {
            text: format!("{} heard {} samples", model, self.samples),
            score: self.score,
            uttid,
        }))
    }

    fn working_set(&self) -> &WorkingSet<String> {
        &self.working_set
    }

    fn working_set_mut(&mut self) -> &mut WorkingSet<String> {
        &mut self.working_set
    }

    fn update_working_set(&mut self) -> Result<(), DecoderError> {
        let active = self
            .working_set
            .active()
            .ok_or(DecoderError::EmptyWorkingSet)?
            .model
            .clone();
        self.record(Call::Update(active.clone()));
        self.installed = Some(active);
        Ok(())
    }
}

/// Client bytes in, server bytes out
pub struct MockStream {
    input: Cursor<Vec<u8>>,
    pub output: Vec<u8>,
}

impl MockStream {
    pub fn new(input: Vec<u8>) -> Self {
        Self {
            input: Cursor::new(input),
            output: Vec::new(),
        }
    }

    pub fn consumed(&self) -> u64 {
        self.input.position()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 16 kHz PCM16 test tone
pub fn tone(samples: usize) -> Vec<i16> {
    (0..samples)
        .map(|i| ((i as f32 * 0.2).sin() * 8000.0) as i16)
        .collect()
}
