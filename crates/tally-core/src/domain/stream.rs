//! Stream descriptors and source groups reported by the switcher.
//!
//! The switcher organises its inputs into *source groups*.  Each group holds
//! an ordered list of streams; a stream can be disabled on the device, in
//! which case the bridge never binds it to a tally index.

use serde::{Deserialize, Serialize};

/// One source the switcher can route to an output.
///
/// Identity is [`id`](Self::id).  `name` and `url` are passed through
/// unchanged to the device when the stream is staged for preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Device-assigned stream identifier.
    pub id: String,
    /// Display name shown in the switcher UI.
    pub name: String,
    /// Transport URL of the stream (e.g. `rtsp://…` or an NDI name).
    pub url: String,
    /// Whether the stream is enabled on the device.
    pub enabled: bool,
}

impl StreamDescriptor {
    /// Convenience constructor used mostly by tests and fixtures.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        enabled: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            enabled,
        }
    }
}

/// An ordered collection of streams as returned by device enumeration.
///
/// Only used while building the [`crate::StreamRegistry`]; it is not retained
/// afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGroup {
    pub streams: Vec<StreamDescriptor>,
}

impl SourceGroup {
    pub fn new(streams: Vec<StreamDescriptor>) -> Self {
        Self { streams }
    }

    /// Iterates over the enabled streams in discovery order.
    pub fn enabled_streams(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.iter().filter(|s| s.enabled)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
