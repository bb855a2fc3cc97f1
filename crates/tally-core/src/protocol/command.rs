//! Recognition of "set input" control commands inside OSC messages.
//!
//! Two spellings are accepted for the same command:
//!
//! ```text
//! /kiloview/setInput/3            index in the address
//! /kiloview/setInput  ,i 3        index as the first int argument
//! ```
//!
//! Anything else is not a command.  The matcher never errors: the inbound
//! channel is unauthenticated and best-effort, so unrecognised traffic is the
//! caller's to log and drop.  Range checking against the registry capacity
//! happens in the registry.

use crate::protocol::messages::OscMessage;

/// Address prefix used by the reference control surface.
pub const DEFAULT_ADDRESS_PREFIX: &str = "/kiloview/setInput";

/// A decoded control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Make the stream bound to this tally index the program output.
    SetInput(u32),
}

/// Matches OSC messages against a configured "set input" address prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMatcher {
    prefix: String,
}

impl Default for CommandMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS_PREFIX)
    }
}

impl CommandMatcher {
    /// Creates a matcher.  A trailing `/` on `prefix` is ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        while prefix.len() > 1 && prefix.ends_with('/') {
            prefix.pop();
        }
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the command carried by `msg`, or `None` if it is not one.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tally_core::{CommandMatcher, ControlCommand, OscMessage};
    ///
    /// let matcher = CommandMatcher::default();
    /// let msg = OscMessage::new("/kiloview/setInput/2", vec![]);
    /// assert_eq!(matcher.parse(&msg), Some(ControlCommand::SetInput(2)));
    /// ```
    pub fn parse(&self, msg: &OscMessage) -> Option<ControlCommand> {
        let rest = msg.address.strip_prefix(self.prefix.as_str())?;

        if rest.is_empty() {
            let value = msg.args.first()?.as_integer()?;
            return u32::try_from(value)
                .ok()
                .filter(|v| *v > 0)
                .map(ControlCommand::SetInput);
        }

        let digits = rest.strip_prefix('/')?;
        parse_index(digits).map(ControlCommand::SetInput)
    }
}

/// Parses a strictly-decimal positive index (no sign, no whitespace).
fn parse_index(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|v| *v > 0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::OscArg;

    fn parse(address: &str, args: Vec<OscArg>) -> Option<ControlCommand> {
        CommandMatcher::default().parse(&OscMessage::new(address, args))
    }

    #[test]
    fn test_index_in_address_is_recognised() {
        assert_eq!(
            parse("/kiloview/setInput/1", vec![]),
            Some(ControlCommand::SetInput(1))
        );
        assert_eq!(
            parse("/kiloview/setInput/4", vec![]),
            Some(ControlCommand::SetInput(4))
        );
    }

    #[test]
    fn test_multi_digit_and_out_of_range_indices_still_parse() {
        // Range is the registry's concern, not the matcher's.
        assert_eq!(
            parse("/kiloview/setInput/12", vec![]),
            Some(ControlCommand::SetInput(12))
        );
    }

    #[test]
    fn test_index_as_int_argument_is_recognised() {
        assert_eq!(
            parse("/kiloview/setInput", vec![OscArg::Int(3)]),
            Some(ControlCommand::SetInput(3))
        );
        assert_eq!(
            parse("/kiloview/setInput", vec![OscArg::Long(2)]),
            Some(ControlCommand::SetInput(2))
        );
    }

    #[test]
    fn test_zero_is_rejected() {
        assert_eq!(parse("/kiloview/setInput/0", vec![]), None);
        assert_eq!(parse("/kiloview/setInput", vec![OscArg::Int(0)]), None);
    }

    #[test]
    fn test_negative_argument_is_rejected() {
        assert_eq!(parse("/kiloview/setInput", vec![OscArg::Int(-1)]), None);
    }

    #[test]
    fn test_malformed_index_segments_are_rejected() {
        for address in [
            "/kiloview/setInput/",
            "/kiloview/setInput/-1",
            "/kiloview/setInput/+1",
            "/kiloview/setInput/1a",
            "/kiloview/setInput/ 1",
            "/kiloview/setInput/1/2",
            "/kiloview/setInput/99999999999",
        ] {
            assert_eq!(parse(address, vec![]), None, "{address} must be ignored");
        }
    }

    #[test]
    fn test_other_addresses_are_ignored() {
        assert_eq!(parse("/kiloview/setOutput/1", vec![]), None);
        assert_eq!(parse("/kiloview/setInput2", vec![]), None);
        assert_eq!(parse("/other", vec![OscArg::Int(1)]), None);
    }

    #[test]
    fn test_prefix_form_without_integer_argument_is_ignored() {
        assert_eq!(parse("/kiloview/setInput", vec![]), None);
        assert_eq!(
            parse("/kiloview/setInput", vec![OscArg::Float(1.0)]),
            None
        );
        assert_eq!(
            parse("/kiloview/setInput", vec![OscArg::String("1".into())]),
            None
        );
    }

    #[test]
    fn test_custom_prefix_trailing_slash_is_trimmed() {
        let matcher = CommandMatcher::new("/atem/program/");
        assert_eq!(matcher.prefix(), "/atem/program");
        assert_eq!(
            matcher.parse(&OscMessage::new("/atem/program/2", vec![])),
            Some(ControlCommand::SetInput(2))
        );
        assert_eq!(
            matcher.parse(&OscMessage::new("/kiloview/setInput/2", vec![])),
            None
        );
    }
}
