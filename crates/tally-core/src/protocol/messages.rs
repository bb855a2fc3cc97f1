//! Open Sound Control (OSC 1.0) packet types.
//!
//! A control desk sends the bridge one OSC *packet* per UDP datagram.  A
//! packet is either a single [`OscMessage`] or a *bundle* that groups several
//! packets under one time tag.  The bridge executes commands as soon as they
//! arrive, so bundle time tags are decoded but otherwise ignored.

// ── Wire constants ────────────────────────────────────────────────────────────

/// Marker string that opens every bundle (`"#bundle"` + NUL).
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// OSC time tag value meaning "immediately".
pub const TIMETAG_IMMEDIATE: u64 = 1;

// ── Arguments ─────────────────────────────────────────────────────────────────

/// A single typed OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    /// `i` – 32-bit big-endian two's complement integer.
    Int(i32),
    /// `f` – 32-bit big-endian IEEE 754 float.
    Float(f32),
    /// `s` – NUL-terminated, 4-byte padded string.
    String(String),
    /// `b` – length-prefixed, 4-byte padded byte blob.
    Blob(Vec<u8>),
    /// `h` – 64-bit big-endian integer.
    Long(i64),
    /// `d` – 64-bit big-endian IEEE 754 double.
    Double(f64),
    /// `T` / `F` – boolean carried in the type tag alone.
    Bool(bool),
    /// `N` – nil.
    Nil,
    /// `I` – infinitum ("impulse").
    Impulse,
}

impl OscArg {
    /// The type-tag character that identifies this argument on the wire.
    pub fn type_tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::String(_) => 's',
            OscArg::Blob(_) => 'b',
            OscArg::Long(_) => 'h',
            OscArg::Double(_) => 'd',
            OscArg::Bool(true) => 'T',
            OscArg::Bool(false) => 'F',
            OscArg::Nil => 'N',
            OscArg::Impulse => 'I',
        }
    }

    /// Returns the value as an `i64` for the integer argument kinds.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            OscArg::Int(v) => Some(i64::from(*v)),
            OscArg::Long(v) => Some(*v),
            _ => None,
        }
    }
}

// ── Messages and bundles ──────────────────────────────────────────────────────

/// An OSC message: an address pattern plus zero or more arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    /// Address pattern, always starting with `/` (e.g. `/kiloview/setInput/2`).
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }
}

/// An OSC bundle: a time tag and a list of nested packets.
#[derive(Debug, Clone, PartialEq)]
pub struct OscBundle {
    /// 64-bit NTP-format time tag.  [`TIMETAG_IMMEDIATE`] means "now".
    pub timetag: u64,
    pub content: Vec<OscPacket>,
}

/// Top-level OSC packet carried by one datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle(OscBundle),
}

impl OscPacket {
    /// Flattens the packet into its messages, depth-first in wire order.
    pub fn messages(&self) -> Vec<&OscMessage> {
        let mut out = Vec::new();
        collect_messages(self, &mut out);
        out
    }

    /// Consumes the packet, returning its messages in wire order.
    pub fn into_messages(self) -> Vec<OscMessage> {
        match self {
            OscPacket::Message(msg) => vec![msg],
            OscPacket::Bundle(bundle) => bundle
                .content
                .into_iter()
                .flat_map(OscPacket::into_messages)
                .collect(),
        }
    }
}

fn collect_messages<'a>(packet: &'a OscPacket, out: &mut Vec<&'a OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for inner in &bundle.content {
                collect_messages(inner, out);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
