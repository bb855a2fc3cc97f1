//! tally-bridge entry point.
//!
//! Bridges OSC "set input" commands from a control desk to a video
//! switcher's authenticated HTTP API.
//!
//! # What happens at startup
//!
//! 1. CLI arguments are parsed with `clap`; the TOML config file they point
//!    to is loaded (optional with `--simulate`) and the CLI overrides are
//!    applied on top.
//! 2. `tracing_subscriber` is initialised.  `RUST_LOG` wins; otherwise the
//!    config's `logging.level` applies.
//! 3. A Ctrl+C handler is spawned; it clears a shared `AtomicBool`.
//! 4. The bridge logs in, enumerates sources, warms previews, and starts the
//!    UDP control listener and the HTTP status server.  Any failure before
//!    the listeners start ends the process with an error.

use std::io;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tally_bridge::application::device::DeviceApi;
use tally_bridge::infrastructure::device_http::HttpDeviceApi;
use tally_bridge::infrastructure::runner::run_bridge;
use tally_bridge::infrastructure::simulated_device::SimulatedDevice;
use tally_bridge::infrastructure::storage::config::{load_config, BridgeConfig, ConfigError};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// OSC-to-HTTP bridge for tally-driven video switching.
///
/// Listens for `/kiloview/setInput/N` OSC messages and switches the device's
/// program output to the N-th enabled source.
#[derive(Debug, Parser)]
#[command(
    name = "tally-bridge",
    about = "OSC-to-HTTP bridge for tally-driven video switching",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml", env = "TALLY_BRIDGE_CONFIG")]
    config: PathBuf,

    /// Overrides `control.port`.
    #[arg(long)]
    control_port: Option<u16>,

    /// Overrides `status.port`.
    #[arg(long)]
    status_port: Option<u16>,

    /// Overrides `device.address`.
    #[arg(long)]
    device_address: Option<String>,

    /// Use an in-memory switcher with this many sources instead of the
    /// configured device.  For rehearsing a control surface.  The config
    /// file becomes optional; built-in defaults apply when it is missing.
    #[arg(long, value_name = "SOURCES")]
    simulate: Option<usize>,
}

impl Cli {
    /// Loads the config file, or built-in defaults when simulating without
    /// one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    fn load(&self) -> anyhow::Result<BridgeConfig> {
        match load_config(&self.config) {
            Err(ConfigError::Io { source, .. })
                if self.simulate.is_some() && source.kind() == io::ErrorKind::NotFound =>
            {
                Ok(BridgeConfig::simulated())
            }
            other => other.with_context(|| format!("failed to load {}", self.config.display())),
        }
    }

    /// Applies command-line overrides on top of the file configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the overridden configuration no longer validates.
    fn apply_overrides(&self, mut config: BridgeConfig) -> anyhow::Result<BridgeConfig> {
        if let Some(port) = self.control_port {
            config.control.port = port;
        }
        if let Some(port) = self.status_port {
            config.status.port = port;
        }
        if let Some(address) = &self.device_address {
            config.device.address = address.clone();
        }
        config
            .validate()
            .context("configuration invalid after command-line overrides")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = cli.apply_overrides(cli.load()?)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let api: Arc<dyn DeviceApi> = match cli.simulate {
        Some(sources) => {
            info!(sources, "using simulated switcher");
            Arc::new(SimulatedDevice::with_demo_sources(sources))
        }
        None => {
            info!(device = %config.device.base_url(), "using switcher");
            Arc::new(
                HttpDeviceApi::new(&config.device, &config.output)
                    .context("failed to create device client")?,
            )
        }
    };

    // Shutdown flag shared by the control listener and the status server.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_bridge(&config, api, running).await?;

    info!("tally-bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
