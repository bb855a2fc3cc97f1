//! Binary codec for Open Sound Control packets.
//!
//! Wire format (OSC 1.0, all integers big-endian):
//! ```text
//! message: [address:osc-string][",tags":osc-string][arg]*
//! bundle:  ["#bundle\0":8][timetag:8]([size:4][packet:size])*
//!
//! osc-string: UTF-8 bytes, NUL terminator, zero-padded to a multiple of 4
//! blob:       [size:4][bytes:size], zero-padded to a multiple of 4
//! ```
//!
//! Only decoding is on the bridge's hot path.  Encoding is provided so tests,
//! benchmarks and operator tooling can produce byte-exact datagrams.

use thiserror::Error;

use crate::protocol::messages::{OscArg, OscBundle, OscMessage, OscPacket, BUNDLE_TAG};

/// Bundles nested deeper than this are rejected.
pub const MAX_BUNDLE_DEPTH: usize = 8;

/// Errors that can occur while decoding an OSC packet.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    /// The byte slice ended before a complete field could be read.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// An OSC string ran to the end of the buffer without a NUL byte.
    #[error("string at offset {0} is not NUL-terminated")]
    UnterminatedString(usize),

    /// An OSC string contained bytes that are not valid UTF-8.
    #[error("invalid UTF-8 in string at offset {0}")]
    InvalidUtf8(usize),

    /// The address pattern does not start with `/`.
    #[error("invalid address pattern: {0:?}")]
    InvalidAddress(String),

    /// The type-tag string does not start with `,`.
    #[error("invalid type tag string: {0:?}")]
    InvalidTypeTags(String),

    /// A type tag the decoder does not understand (e.g. arrays, MIDI).
    #[error("unsupported type tag: {0:?}")]
    UnsupportedTypeTag(char),

    /// A blob or bundle-element size was negative or misaligned.
    #[error("invalid length {length} at offset {offset}")]
    InvalidLength { length: i32, offset: usize },

    /// Bundles were nested deeper than [`MAX_BUNDLE_DEPTH`].
    #[error("bundle nesting exceeds maximum depth")]
    NestingTooDeep,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one OSC packet from a complete datagram.
///
/// # Errors
///
/// Returns [`CodecError`] if the bytes are not a well-formed OSC packet.
///
/// # Examples
///
/// ```rust
/// use tally_core::protocol::{decode_packet, encode_message, OscMessage, OscPacket};
///
/// let msg = OscMessage::new("/kiloview/setInput/2", vec![]);
/// let bytes = encode_message(&msg);
/// assert_eq!(decode_packet(&bytes).unwrap(), OscPacket::Message(msg));
/// ```
pub fn decode_packet(bytes: &[u8]) -> Result<OscPacket, CodecError> {
    decode_packet_at_depth(bytes, 0)
}

/// Encodes a message into its wire form.
///
/// A type-tag string is always written, even when there are no arguments.
pub fn encode_message(msg: &OscMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(padded_len(msg.address.len() + 1) + 8);
    write_string(&mut buf, &msg.address);

    let mut tags = String::with_capacity(msg.args.len() + 1);
    tags.push(',');
    tags.extend(msg.args.iter().map(OscArg::type_tag));
    write_string(&mut buf, &tags);

    for arg in &msg.args {
        match arg {
            OscArg::Int(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscArg::Float(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscArg::String(s) => write_string(&mut buf, s),
            OscArg::Blob(data) => {
                let len = i32::try_from(data.len()).unwrap_or(i32::MAX);
                buf.extend_from_slice(&len.to_be_bytes());
                buf.extend_from_slice(&data[..len as usize]);
                pad(&mut buf);
            }
            OscArg::Long(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscArg::Double(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscArg::Bool(_) | OscArg::Nil | OscArg::Impulse => {}
        }
    }
    buf
}

/// Encodes a message or bundle into its wire form.
pub fn encode_packet(packet: &OscPacket) -> Vec<u8> {
    match packet {
        OscPacket::Message(msg) => encode_message(msg),
        OscPacket::Bundle(bundle) => {
            let mut buf = Vec::with_capacity(16);
            buf.extend_from_slice(BUNDLE_TAG);
            buf.extend_from_slice(&bundle.timetag.to_be_bytes());
            for inner in &bundle.content {
                let element = encode_packet(inner);
                buf.extend_from_slice(&(element.len() as u32).to_be_bytes());
                buf.extend_from_slice(&element);
            }
            buf
        }
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

fn decode_packet_at_depth(bytes: &[u8], depth: usize) -> Result<OscPacket, CodecError> {
    if bytes.starts_with(BUNDLE_TAG) {
        decode_bundle(bytes, depth).map(OscPacket::Bundle)
    } else {
        decode_message(bytes).map(OscPacket::Message)
    }
}

fn decode_bundle(bytes: &[u8], depth: usize) -> Result<OscBundle, CodecError> {
    if depth >= MAX_BUNDLE_DEPTH {
        return Err(CodecError::NestingTooDeep);
    }

    let mut reader = Reader::new(bytes);
    reader.take(BUNDLE_TAG.len())?;
    let timetag = reader.read_u64()?;

    let mut content = Vec::new();
    while reader.remaining() > 0 {
        let offset = reader.pos;
        let length = reader.read_i32()?;
        if length < 0 || length % 4 != 0 {
            return Err(CodecError::InvalidLength { length, offset });
        }
        let element = reader.take(length as usize)?;
        content.push(decode_packet_at_depth(element, depth + 1)?);
    }

    Ok(OscBundle { timetag, content })
}

fn decode_message(bytes: &[u8]) -> Result<OscMessage, CodecError> {
    let mut reader = Reader::new(bytes);

    let address = reader.read_string()?;
    if !address.starts_with('/') {
        return Err(CodecError::InvalidAddress(address));
    }

    // Very old senders omit the type-tag string entirely.
    if reader.remaining() == 0 {
        return Ok(OscMessage::new(address, Vec::new()));
    }

    let tag_string = reader.read_string()?;
    if !tag_string.starts_with(',') {
        return Err(CodecError::InvalidTypeTags(tag_string));
    }
    let tags = &tag_string[1..];

    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        let arg = match tag {
            'i' => OscArg::Int(reader.read_i32()?),
            'f' => OscArg::Float(f32::from_bits(reader.read_u32()?)),
            's' => OscArg::String(reader.read_string()?),
            'b' => OscArg::Blob(reader.read_blob()?),
            'h' => OscArg::Long(reader.read_u64()? as i64),
            'd' => OscArg::Double(f64::from_bits(reader.read_u64()?)),
            'T' => OscArg::Bool(true),
            'F' => OscArg::Bool(false),
            'N' => OscArg::Nil,
            'I' => OscArg::Impulse,
            other => return Err(CodecError::UnsupportedTypeTag(other)),
        };
        args.push(arg);
    }

    Ok(OscMessage::new(address, args))
}

// ── Utility helpers ───────────────────────────────────────────────────────────

/// Forward-only cursor over a datagram.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::InsufficientData {
                needed: self.pos + n,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.read_u32().map(|v| v as i32)
    }

    fn read_u64(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a NUL-terminated string and skips its padding.
    fn read_string(&mut self) -> Result<String, CodecError> {
        let start = self.pos;
        let rest = &self.buf[start..];
        if rest.is_empty() {
            return Err(CodecError::InsufficientData {
                needed: start + 4,
                available: self.buf.len(),
            });
        }
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::UnterminatedString(start))?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| CodecError::InvalidUtf8(start))?
            .to_string();
        self.take(padded_len(nul + 1))?;
        Ok(s)
    }

    fn read_blob(&mut self) -> Result<Vec<u8>, CodecError> {
        let offset = self.pos;
        let length = self.read_i32()?;
        if length < 0 {
            return Err(CodecError::InvalidLength { length, offset });
        }
        let data = self.take(length as usize)?.to_vec();
        self.take(padded_len(length as usize) - length as usize)?;
        Ok(data)
    }
}

/// Rounds `n` up to the next multiple of 4.
fn padded_len(n: usize) -> usize {
    (n + 3) & !3
}

/// Writes `s` as an OSC string: bytes, NUL, zero padding to 4.
fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    pad(buf);
}

fn pad(buf: &mut Vec<u8>) {
    let target = padded_len(buf.len());
    buf.resize(target, 0);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
