//! Application layer use cases for the bridge.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure business rules) and the infrastructure (sockets, HTTP, files).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a goal (e.g., "make tally
//!   index 2 the program output").
//! - **Depend on abstractions** ([`device::DeviceApi`]) rather than on the
//!   concrete HTTP client, so the switching logic is testable without a
//!   switcher on the bench.
//! - **Contain no socket or file-system access**.  Timers are the one
//!   exception: every device call is bounded by a timeout here so that the
//!   bound holds no matter which `DeviceApi` implementation is plugged in.
//!
//! # Sub-modules
//!
//! - **`device`**        – The `DeviceApi` seam, the credential type, the
//!   device error taxonomy, and `DeviceClient`, which attaches the current
//!   credential to every call.
//! - **`session`**       – Owns the credential slot: acquire, read,
//!   invalidate.
//! - **`switch_output`** – The two-phase preview→program state machine with
//!   per-index mutual exclusion.  This is the heart of the bridge.
//! - **`startup`**       – Authenticate, enumerate, build the registry, and
//!   warm the device's preview state before serving commands.

pub mod device;
pub mod session;
pub mod startup;
pub mod switch_output;
