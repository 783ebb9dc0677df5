//! Request and response framing.
//!
//! Request:  `[i32 length][i32 tag][length bytes payload]`
//! Response: `[i32 length][length bytes payload]`, a non-empty payload being
//! `[i32 confidence][hypothesis bytes]`. All integers are little-endian.

use byteorder::{ByteOrder, LittleEndian};
use std::io::{self, Read, Write};

use crate::decoder::Hypothesis;
use crate::error::ProtocolError;

/// Default request payload limit and response buffer size (bytes)
pub const DEFAULT_MAX_FRAME: usize = 32 * 1024;

const HEADER_LEN: usize = 8;
const CONFIDENCE_LEN: usize = 4;

/// Request type tags as they appear on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RequestTag {
    Grammar = 0,
    Start = 1,
    Data = 2,
    Finish = 3,
}

impl RequestTag {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Grammar),
            1 => Some(Self::Start),
            2 => Some(Self::Data),
            3 => Some(Self::Finish),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for RequestTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestTag::Grammar => write!(f, "GRAMMAR"),
            RequestTag::Start => write!(f, "START"),
            RequestTag::Data => write!(f, "DATA"),
            RequestTag::Finish => write!(f, "FINISH"),
        }
    }
}

/// A decoded client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Switch the active model
    Grammar(String),
    /// Reserved marker, acknowledged without effect
    Start,
    /// Raw PCM16 little-endian audio
    Data(Vec<u8>),
    /// Close the utterance and return the final hypothesis
    Finish,
    /// Tag outside the known set; the payload has been consumed
    Unknown { tag: i32 },
}

impl Request {
    fn from_parts(tag: i32, payload: Vec<u8>) -> Self {
        match RequestTag::from_code(tag) {
            Some(RequestTag::Grammar) => Request::Grammar(model_name(&payload)),
            Some(RequestTag::Start) => Request::Start,
            Some(RequestTag::Data) => Request::Data(payload),
            Some(RequestTag::Finish) => Request::Finish,
            None => Request::Unknown { tag },
        }
    }

    /// Serialize for the wire. GRAMMAR names are NUL-terminated.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let (tag, payload): (i32, Vec<u8>) = match self {
            Request::Grammar(name) => {
                let mut bytes = name.as_bytes().to_vec();
                bytes.push(0);
                (RequestTag::Grammar.code(), bytes)
            }
            Request::Start => (RequestTag::Start.code(), Vec::new()),
            Request::Data(pcm) => (RequestTag::Data.code(), pcm.clone()),
            Request::Finish => (RequestTag::Finish.code(), Vec::new()),
            Request::Unknown { tag } => (*tag, Vec::new()),
        };

        let len = i32::try_from(payload.len())
            .map_err(|_| ProtocolError::PayloadTooLarge(payload.len()))?;

        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Request::Grammar(_) => "GRAMMAR",
            Request::Start => "START",
            Request::Data(_) => "DATA",
            Request::Finish => "FINISH",
            Request::Unknown { .. } => "UNKNOWN",
        }
    }
}

/// Model names are sent as C strings; anything past the first NUL is ignored.
fn model_name(payload: &[u8]) -> String {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

/// Decode a PCM16 little-endian payload. A trailing odd byte is dropped.
pub fn pcm16_samples(payload: &[u8]) -> Vec<i16> {
    let even = payload.len() - payload.len() % 2;
    let mut samples = vec![0i16; even / 2];
    LittleEndian::read_i16_into(&payload[..even], &mut samples);
    samples
}

/// Encode samples as a PCM16 little-endian payload
pub fn pcm16_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * 2];
    LittleEndian::write_i16_into(samples, &mut bytes);
    bytes
}

/// Read one request. `Ok(None)` means the peer closed the connection
/// cleanly between frames.
pub fn read_request<R: Read>(
    reader: &mut R,
    max_frame: usize,
) -> Result<Option<Request>, ProtocolError> {
    let mut header = [0u8; HEADER_LEN];
    if !read_header(reader, &mut header)? {
        return Ok(None);
    }

    let len = LittleEndian::read_i32(&header[..4]);
    let tag = LittleEndian::read_i32(&header[4..]);

    if len < 0 {
        return Err(ProtocolError::NegativeLength(len));
    }
    if len as usize > max_frame {
        return Err(ProtocolError::Oversize { len, max: max_frame });
    }

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .map_err(ProtocolError::ShortRead)?;

    Ok(Some(Request::from_parts(tag, payload)))
}

/// Fill the header, distinguishing a clean close (no bytes at all) from a
/// truncated header.
fn read_header<R: Read>(reader: &mut R, header: &mut [u8]) -> Result<bool, ProtocolError> {
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(ProtocolError::ShortRead(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("read {} bytes, expecting {}", filled, header.len()),
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtocolError::ShortRead(e)),
        }
    }
    Ok(true)
}

/// A hypothesis as sent to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredText {
    /// Confidence surrogate in `[0, 1000]`
    pub confidence: i32,
    pub text: String,
}

/// Reply to one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub hypothesis: Option<ScoredText>,
}

impl Response {
    /// Reply carrying no hypothesis
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_hypothesis(hyp: &Hypothesis) -> Self {
        if hyp.text.is_empty() {
            return Self::empty();
        }
        Self {
            hypothesis: Some(ScoredText {
                confidence: hyp.confidence(),
                text: hyp.text.clone(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hypothesis.is_none()
    }

    /// Serialize for the wire, truncating the text so the payload fits in
    /// `max_frame` bytes.
    pub fn encode(&self, max_frame: usize) -> Vec<u8> {
        let Some(ref hyp) = self.hypothesis else {
            return 0i32.to_le_bytes().to_vec();
        };

        // The length field is an i32, so the payload never exceeds i32::MAX
        let limit = max_frame.min(i32::MAX as usize);
        let room = limit.saturating_sub(CONFIDENCE_LEN);
        let text = &hyp.text.as_bytes()[..hyp.text.len().min(room)];
        let len = (CONFIDENCE_LEN + text.len()) as i32;

        let mut buf = Vec::with_capacity(4 + len as usize);
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&hyp.confidence.to_le_bytes());
        buf.extend_from_slice(text);
        buf
    }
}

/// Write one response in a single call
pub fn write_response<W: Write>(
    writer: &mut W,
    response: &Response,
    max_frame: usize,
) -> Result<(), ProtocolError> {
    let buf = response.encode(max_frame);
    writer.write_all(&buf).map_err(ProtocolError::ShortWrite)?;
    writer.flush().map_err(ProtocolError::ShortWrite)
}

/// Client side: read one response
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .map_err(ProtocolError::ShortRead)?;
    let len = LittleEndian::read_i32(&len_buf);
    if len < 0 {
        return Err(ProtocolError::NegativeLength(len));
    }
    if len == 0 {
        return Ok(Response::empty());
    }

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .map_err(ProtocolError::ShortRead)?;
    if payload.len() < CONFIDENCE_LEN {
        return Err(ProtocolError::ShortRead(io::Error::new(
            io::ErrorKind::InvalidData,
            "response payload shorter than the confidence field",
        )));
    }

    Ok(Response {
        hypothesis: Some(ScoredText {
            confidence: LittleEndian::read_i32(&payload[..CONFIDENCE_LEN]),
            text: String::from_utf8_lossy(&payload[CONFIDENCE_LEN..]).into_owned(),
        }),
    })
}
