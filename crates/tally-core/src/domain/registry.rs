//! Tally index → stream binding table.
//!
//! The [`StreamRegistry`] is built once at startup from the switcher's source
//! inventory and is read-only afterwards.  It answers a single question on
//! the hot path: "which stream does tally index N select?"
//!
//! # Binding rules
//!
//! Groups are walked in order, then streams within each group in order.
//! Disabled streams are skipped.  Each enabled stream receives the next
//! unused index starting at 1, until the registry's capacity is reached.
//! Enabled streams discovered after that are left unbound; this is a
//! documented capacity limit, not an error.
//!
//! ```text
//! groups:   [ s1(on) s2(off) s3(on) ] [ s4(on) s5(on) ]
//! capacity: 4
//! registry: 1→s1  2→s3  3→s4  4→s5
//! ```

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::domain::stream::{SourceGroup, StreamDescriptor};

/// Default number of switchable inputs.
pub const MAX_INPUTS: usize = 4;

/// Error type for registry lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No stream is bound to the requested index.
    ///
    /// Returned for indices below 1, beyond the registry capacity, and for
    /// in-range slots that were never filled.
    #[error("no stream bound to tally index {0}")]
    UnknownIndex(i64),
}

/// A small positive integer identifying a switchable input.
///
/// Zero is never a valid tally index; the only way to obtain one is
/// [`TallyIndex::new`], which rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TallyIndex(u16);

impl TallyIndex {
    /// Returns `None` for 0 and for values that do not fit in a `u16`.
    pub fn new(value: u32) -> Option<Self> {
        match u16::try_from(value) {
            Ok(0) | Err(_) => None,
            Ok(v) => Some(Self(v)),
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// Zero-based slot position.
    fn slot(self) -> usize {
        usize::from(self.0) - 1
    }
}

impl fmt::Display for TallyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed-capacity mapping from [`TallyIndex`] to [`StreamDescriptor`].
///
/// Internally a vector of `capacity` slots where `None` is the explicit
/// "unbound" representation.  Slot `i` holds the stream for index `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRegistry {
    slots: Vec<Option<StreamDescriptor>>,
}

impl StreamRegistry {
    /// Creates a registry with `capacity` unbound slots.
    pub fn empty(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Builds a registry from the device's source inventory.
    ///
    /// See the module documentation for the binding rules.  At most
    /// `capacity` indices are bound.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tally_core::{SourceGroup, StreamDescriptor, StreamRegistry};
    ///
    /// let groups = vec![SourceGroup::new(vec![
    ///     StreamDescriptor::new("s1", "Cam 1", "rtsp://a", true),
    ///     StreamDescriptor::new("s2", "Cam 2", "rtsp://b", false),
    ///     StreamDescriptor::new("s3", "Cam 3", "rtsp://c", true),
    /// ])];
    ///
    /// let registry = StreamRegistry::build(&groups, 4);
    /// assert_eq!(registry.len(), 2);
    /// assert_eq!(registry.resolve(2).unwrap().id, "s3");
    /// assert!(registry.resolve(3).is_err());
    /// ```
    pub fn build(groups: &[SourceGroup], capacity: usize) -> Self {
        let mut registry = Self::empty(capacity);
        let mut next = 0usize;

        for stream in groups.iter().flat_map(SourceGroup::enabled_streams) {
            if next == capacity {
                debug!(
                    stream = %stream.id,
                    capacity,
                    "registry full; leaving enabled stream unbound"
                );
                continue;
            }
            registry.slots[next] = Some(stream.clone());
            next += 1;
        }

        registry
    }

    /// Returns the stream bound to `index`.
    ///
    /// Accepts any integer so that callers holding unvalidated input (e.g. a
    /// decoded control command) get a uniform error for 0, negatives and
    /// out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownIndex`] when no stream is bound.
    pub fn resolve(&self, index: i64) -> Result<&StreamDescriptor, RegistryError> {
        self.lookup(index).map(|(_, stream)| stream)
    }

    /// Like [`resolve`](Self::resolve), but also hands back the validated
    /// [`TallyIndex`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownIndex`] when no stream is bound.
    pub fn lookup(&self, index: i64) -> Result<(TallyIndex, &StreamDescriptor), RegistryError> {
        let tally = u32::try_from(index)
            .ok()
            .and_then(TallyIndex::new)
            .ok_or(RegistryError::UnknownIndex(index))?;
        self.get(tally)
            .map(|stream| (tally, stream))
            .ok_or(RegistryError::UnknownIndex(index))
    }

    /// Returns the stream bound to an already-validated index.
    pub fn get(&self, index: TallyIndex) -> Option<&StreamDescriptor> {
        self.slots.get(index.slot()).and_then(Option::as_ref)
    }

    /// Iterates over all bound `(index, stream)` pairs in index order.
    pub fn bindings(&self) -> impl Iterator<Item = (TallyIndex, &StreamDescriptor)> {
        self.slots.iter().enumerate().filter_map(|(slot, entry)| {
            let stream = entry.as_ref()?;
            let index = TallyIndex::new(u32::try_from(slot + 1).ok()?)?;
            Some((index, stream))
        })
    }

    /// Number of bound indices.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of indices this registry can hold.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(id: &str, enabled: bool) -> StreamDescriptor {
        StreamDescriptor::new(id, format!("name-{id}"), format!("rtsp://{id}"), enabled)
    }

    fn bound_ids(registry: &StreamRegistry) -> Vec<(u16, String)> {
        registry
            .bindings()
            .map(|(i, s)| (i.get(), s.id.clone()))
            .collect()
    }

    // ── TallyIndex ────────────────────────────────────────────────────────────

    #[test]
    fn test_tally_index_rejects_zero() {
        assert!(TallyIndex::new(0).is_none());
    }

    #[test]
    fn test_tally_index_rejects_values_beyond_u16() {
        assert!(TallyIndex::new(70_000).is_none());
    }

    #[test]
    fn test_tally_index_displays_bare_number() {
        let index = TallyIndex::new(3).unwrap();
        assert_eq!(index.to_string(), "3");
    }

    // ── build ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_build_skips_disabled_streams() {
        // Arrange
        let groups = vec![SourceGroup::new(vec![
            stream("s1", true),
            stream("s2", false),
            stream("s3", true),
        ])];

        // Act
        let registry = StreamRegistry::build(&groups, MAX_INPUTS);

        // Assert
        assert_eq!(
            bound_ids(&registry),
            vec![(1, "s1".to_string()), (2, "s3".to_string())]
        );
        assert_eq!(registry.resolve(2).unwrap().id, "s3");
        assert_eq!(registry.resolve(3), Err(RegistryError::UnknownIndex(3)));
    }

    #[test]
    fn test_build_walks_groups_in_order() {
        // Arrange: enabled streams spread across three groups
        let groups = vec![
            SourceGroup::new(vec![stream("a", true)]),
            SourceGroup::new(vec![stream("b", false), stream("c", true)]),
            SourceGroup::new(vec![stream("d", true)]),
        ];

        // Act
        let registry = StreamRegistry::build(&groups, MAX_INPUTS);

        // Assert
        assert_eq!(
            bound_ids(&registry),
            vec![
                (1, "a".to_string()),
                (2, "c".to_string()),
                (3, "d".to_string())
            ]
        );
    }

    #[test]
    fn test_build_stops_at_capacity() {
        // Arrange: six enabled streams, capacity four
        let groups = vec![
            SourceGroup::new(vec![stream("1", true), stream("2", true), stream("3", true)]),
            SourceGroup::new(vec![stream("4", true), stream("5", true), stream("6", true)]),
        ];

        // Act
        let registry = StreamRegistry::build(&groups, 4);

        // Assert
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.resolve(4).unwrap().id, "4");
        assert!(registry.resolve(5).is_err(), "stream 5 exceeds capacity");
    }

    #[test]
    fn test_build_respects_custom_capacity() {
        let groups = vec![SourceGroup::new(vec![
            stream("x", true),
            stream("y", true),
            stream("z", true),
        ])];

        let registry = StreamRegistry::build(&groups, 2);

        assert_eq!(registry.capacity(), 2);
        assert_eq!(registry.len(), 2);
        assert!(registry.resolve(3).is_err());
    }

    #[test]
    fn test_build_with_no_enabled_streams_is_empty() {
        let groups = vec![SourceGroup::new(vec![stream("s1", false)]), SourceGroup::default()];

        let registry = StreamRegistry::build(&groups, MAX_INPUTS);

        assert!(registry.is_empty());
        assert_eq!(registry.capacity(), MAX_INPUTS);
    }

    #[test]
    fn test_build_never_exceeds_capacity_for_any_enable_pattern() {
        // Exhaustively check every enable bitmask over eight streams.
        for mask in 0u32..256 {
            let streams: Vec<_> = (0..8)
                .map(|i| stream(&i.to_string(), mask & (1 << i) != 0))
                .collect();
            let enabled: Vec<String> = streams
                .iter()
                .filter(|s| s.enabled)
                .map(|s| s.id.clone())
                .collect();
            let groups = vec![
                SourceGroup::new(streams[..4].to_vec()),
                SourceGroup::new(streams[4..].to_vec()),
            ];

            let registry = StreamRegistry::build(&groups, MAX_INPUTS);

            let expected: Vec<(u16, String)> = enabled
                .into_iter()
                .take(MAX_INPUTS)
                .enumerate()
                .map(|(i, id)| (i as u16 + 1, id))
                .collect();
            assert_eq!(bound_ids(&registry), expected, "mask {mask:#010b}");
        }
    }

    // ── resolve ───────────────────────────────────────────────────────────────

    #[test]
    fn test_resolve_rejects_zero_and_negative_indices() {
        let registry = StreamRegistry::build(&[SourceGroup::new(vec![stream("s1", true)])], 4);

        assert_eq!(registry.resolve(0), Err(RegistryError::UnknownIndex(0)));
        assert_eq!(registry.resolve(-1), Err(RegistryError::UnknownIndex(-1)));
        assert_eq!(
            registry.resolve(i64::MIN),
            Err(RegistryError::UnknownIndex(i64::MIN))
        );
    }

    #[test]
    fn test_resolve_rejects_indices_beyond_capacity() {
        let registry = StreamRegistry::build(&[SourceGroup::new(vec![stream("s1", true)])], 4);

        assert!(registry.resolve(5).is_err());
        assert!(registry.resolve(i64::MAX).is_err());
    }

    #[test]
    fn test_lookup_pairs_stream_with_its_index() {
        let registry = StreamRegistry::build(
            &[SourceGroup::new(vec![stream("s1", true), stream("s2", true)])],
            4,
        );

        let (index, found) = registry.lookup(2).unwrap();

        assert_eq!(index.get(), 2);
        assert_eq!(found.id, "s2");
        assert_eq!(registry.lookup(3), Err(RegistryError::UnknownIndex(3)));
    }

    #[test]
    fn test_get_returns_bound_stream_for_valid_index() {
        let registry = StreamRegistry::build(&[SourceGroup::new(vec![stream("s1", true)])], 4);

        let index = TallyIndex::new(1).unwrap();
        assert_eq!(registry.get(index).map(|s| s.id.as_str()), Some("s1"));
        assert!(registry.get(TallyIndex::new(2).unwrap()).is_none());
        assert!(registry.get(TallyIndex::new(9).unwrap()).is_none());
    }

    #[test]
    fn test_unknown_index_error_message_names_the_index() {
        let err = RegistryError::UnknownIndex(7);
        assert_eq!(err.to_string(), "no stream bound to tally index 7");
    }
}
