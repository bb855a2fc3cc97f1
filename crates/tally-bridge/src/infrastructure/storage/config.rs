//! TOML configuration for the bridge.
//!
//! The bridge reads one file at startup.  Only the device address and login
//! identity are mandatory; everything else has a default that matches the
//! reference deployment:
//!
//! ```toml
//! [device]
//! address = "192.168.1.10"
//! username = "admin"
//! password = "admin"
//!
//! [control]
//! port = 9022
//! max_inputs = 4
//! same_index_policy = "queue"
//!
//! [status]
//! port = 5000
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` take the value of
//! `some_fn()` when absent from the file, and whole sections marked
//! `#[serde(default)]` may be omitted entirely.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_core::{DEFAULT_ADDRESS_PREFIX, MAX_INPUTS};
use thiserror::Error;

use crate::application::device::DeviceIdentity;
use crate::application::switch_output::SameIndexPolicy;

/// Largest accepted `control.max_inputs`.
pub const MAX_INPUTS_LIMIT: usize = 64;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The content parsed but describes an unusable setup.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A bind address and port do not form a socket address.
    #[error("invalid socket address {0:?}")]
    Address(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the switcher lives and how to log in to it.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Host or `host:port` of the switcher's HTTP API.
    pub address: String,
    pub username: String,
    pub password: String,
    /// Request header that carries the session token.
    #[serde(default = "default_auth_header")]
    pub auth_header: String,
    /// Value of the auth header on the login request itself.
    #[serde(default = "default_login_header_value")]
    pub login_header_value: String,
    /// Upper bound on every device request, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub paths: EndpointPaths,
}

/// API paths on the switcher, relative to its base URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointPaths {
    #[serde(default = "default_login_path")]
    pub login: String,
    #[serde(default = "default_groups_path")]
    pub list_groups: String,
    #[serde(default = "default_preview_path")]
    pub preview: String,
    #[serde(default = "default_output_path")]
    pub output: String,
}

/// The fixed output slot every switch targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_output_id")]
    pub output_id: String,
    #[serde(default = "default_pos_id")]
    pub pos_id: u32,
}

/// Inbound OSC control channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_control_port")]
    pub port: u16,
    /// OSC address prefix of the "set input" command.
    #[serde(default = "default_address_prefix")]
    pub address_prefix: String,
    /// Number of switchable inputs bound at startup.
    #[serde(default = "default_max_inputs")]
    pub max_inputs: usize,
    /// What happens to a command for an index that is already switching.
    #[serde(default)]
    pub same_index_policy: SameIndexPolicy,
}

/// Local HTTP status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_status_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_auth_header() -> String {
    "app".to_string()
}
fn default_login_header_value() -> String {
    "test".to_string()
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_connect_timeout_ms() -> u64 {
    2000
}
fn default_login_path() -> String {
    "/api/users/login".to_string()
}
fn default_groups_path() -> String {
    "/api/source/groups/list".to_string()
}
fn default_preview_path() -> String {
    "/api/preview/source/modify".to_string()
}
fn default_output_path() -> String {
    "/api/output/source/set".to_string()
}
fn default_output_id() -> String {
    "1".to_string()
}
fn default_pos_id() -> u32 {
    1
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_control_port() -> u16 {
    9022
}
fn default_address_prefix() -> String {
    DEFAULT_ADDRESS_PREFIX.to_string()
}
fn default_max_inputs() -> usize {
    MAX_INPUTS
}
fn default_true() -> bool {
    true
}
fn default_status_port() -> u16 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            login: default_login_path(),
            list_groups: default_groups_path(),
            preview: default_preview_path(),
            output: default_output_path(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_id: default_output_id(),
            pos_id: default_pos_id(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_control_port(),
            address_prefix: default_address_prefix(),
            max_inputs: default_max_inputs(),
            same_index_policy: SameIndexPolicy::default(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_address: default_bind_address(),
            port: default_status_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("auth_header", &self.auth_header)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl DeviceConfig {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `http://{address}`, unless the address already names a scheme.
    pub fn base_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{address}")
        }
    }
}

impl ControlConfig {
    /// # Errors
    ///
    /// [`ConfigError::Address`] if `bind_address` is not an IP literal.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        socket_addr(&self.bind_address, self.port)
    }
}

impl StatusConfig {
    /// # Errors
    ///
    /// [`ConfigError::Address`] if `bind_address` is not an IP literal.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        socket_addr(&self.bind_address, self.port)
    }
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let text = format!("{host}:{port}");
    text.parse().map_err(|_| ConfigError::Address(text))
}

impl BridgeConfig {
    /// Defaults for running against the in-memory switcher, where no device
    /// address or credentials are needed.
    pub fn simulated() -> Self {
        Self {
            device: DeviceConfig {
                address: "simulated".to_string(),
                username: "simulated".to_string(),
                password: String::new(),
                auth_header: default_auth_header(),
                login_header_value: default_login_header_value(),
                request_timeout_ms: default_request_timeout_ms(),
                connect_timeout_ms: default_connect_timeout_ms(),
                paths: EndpointPaths::default(),
            },
            output: OutputConfig::default(),
            control: ControlConfig::default(),
            status: StatusConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Checks the settings that serde alone cannot.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if self.device.address.trim().is_empty() {
            return invalid("device.address must not be empty".to_string());
        }
        if self.device.auth_header.trim().is_empty() {
            return invalid("device.auth_header must not be empty".to_string());
        }
        if self.device.request_timeout_ms == 0 {
            return invalid("device.request_timeout_ms must be positive".to_string());
        }
        if !(1..=MAX_INPUTS_LIMIT).contains(&self.control.max_inputs) {
            return invalid(format!(
                "control.max_inputs must be between 1 and {MAX_INPUTS_LIMIT}, got {}",
                self.control.max_inputs
            ));
        }
        let prefix = &self.control.address_prefix;
        if !prefix.starts_with('/') || (prefix.len() > 1 && prefix.ends_with('/')) {
            return invalid(format!(
                "control.address_prefix must start with '/' and not end with one, got {prefix:?}"
            ));
        }
        self.control.socket_addr()?;
        if self.status.enabled {
            self.status.socket_addr()?;
        }
        Ok(())
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses and validates configuration text.
///
/// # Errors
///
/// [`ConfigError::Parse`] for malformed TOML or missing required fields;
/// [`ConfigError::Invalid`] / [`ConfigError::Address`] from validation.
pub fn parse_config(content: &str) -> Result<BridgeConfig, ConfigError> {
    let cfg: BridgeConfig = toml::from_str(content)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Loads the configuration file at `path`.
///
/// Unlike many tools there is no built-in fallback: the device address and
/// credentials have no usable default, so a missing file is an error.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, otherwise as
/// [`parse_config`].
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
