//! Protocol module containing OSC message types, the packet codec and the
//! control-command matcher.

pub mod codec;
pub mod command;
pub mod messages;

pub use codec::{decode_packet, encode_message, CodecError};
pub use command::{CommandMatcher, ControlCommand, DEFAULT_ADDRESS_PREFIX};
pub use messages::*;
