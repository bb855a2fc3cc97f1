//! tally-bridge library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # Architecture
//!
//! ```text
//! tally-bridge/src/
//! ├── application/       Use cases (no sockets, no files)
//! │   ├── device         DeviceApi seam, credential, DeviceClient
//! │   ├── session        Credential slot: acquire / current / invalidate
//! │   ├── switch_output  Two-phase preview → program state machine
//! │   └── startup        Login, enumerate, build registry, warm previews
//! └── infrastructure/    Adapters
//!     ├── device_http      reqwest client for the switcher API
//!     ├── simulated_device In-memory switcher
//!     ├── control_listener UDP/OSC receive loop
//!     ├── status_server    axum liveness + status endpoint
//!     ├── runner           Wires everything together
//!     └── storage/config   TOML configuration
//! ```

pub mod application;
pub mod infrastructure;
