//! Storage infrastructure: configuration file loading.
//!
//! The bridge keeps no state across restarts; the only thing it reads from
//! disk is its TOML configuration, handled by the `config` sub-module.

pub mod config;
