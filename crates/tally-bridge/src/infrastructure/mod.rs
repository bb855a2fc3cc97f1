//! Infrastructure layer for the bridge.
//!
//! Contains the adapters that touch the outside world: the HTTP client for
//! the switcher, the UDP control socket, the local status server, and the
//! configuration file.  `simulated_device` stands in for the switcher when
//! no hardware is available.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `tally_core`, but `application` must only reach it from tests.

pub mod control_listener;
pub mod device_http;
pub mod runner;
pub mod simulated_device;
pub mod status_server;
pub mod storage;
