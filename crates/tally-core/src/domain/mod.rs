//! Domain entities for the tally bridge.
//!
//! This module contains pure business logic with no I/O dependencies.
//!
//! - **`stream`** – Immutable descriptions of the sources the switcher can
//!   route ([`StreamDescriptor`]) and the groups they are enumerated in.
//! - **`registry`** – The [`StreamRegistry`]: which stream each tally index
//!   selects.

pub mod registry;
pub mod stream;

pub use registry::{RegistryError, StreamRegistry, TallyIndex, MAX_INPUTS};
pub use stream::{SourceGroup, StreamDescriptor};
