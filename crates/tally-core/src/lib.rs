//! # tally-core
//!
//! Shared library for the tally bridge containing the stream registry and the
//! inbound control-message codec.
//!
//! This crate has zero dependencies on sockets, HTTP clients, or async
//! runtimes.  Everything here is a pure function of its inputs, which keeps
//! the index→stream mapping and the packet decoder trivially testable.
//!
//! # Architecture overview (for beginners)
//!
//! The bridge sits between a lighting/show-control desk that emits numbered
//! "set input" commands and a network video switcher that only speaks an
//! authenticated HTTP API.  A control command says "make input 3 live"; the
//! bridge looks up which stream is bound to tally index 3 and tells the
//! switcher to put that stream on its program output.
//!
//! This crate defines:
//!
//! - **`domain`** – The values the switcher reports (streams grouped into
//!   source groups) and the [`StreamRegistry`], a fixed-capacity table that
//!   binds small positive integers ("tally indices") to streams.
//!
//! - **`protocol`** – How control commands arrive on the wire.  Commands are
//!   Open Sound Control (OSC) messages carried in UDP datagrams; the codec
//!   decodes the packet and the [`CommandMatcher`] turns an address such as
//!   `/kiloview/setInput/2` into [`ControlCommand::SetInput`].

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `tally_core::StreamRegistry` instead of the full module path.
pub use domain::registry::{RegistryError, StreamRegistry, TallyIndex, MAX_INPUTS};
pub use domain::stream::{SourceGroup, StreamDescriptor};
pub use protocol::codec::{decode_packet, encode_message, CodecError};
pub use protocol::command::{CommandMatcher, ControlCommand, DEFAULT_ADDRESS_PREFIX};
pub use protocol::messages::{OscArg, OscMessage, OscPacket};
