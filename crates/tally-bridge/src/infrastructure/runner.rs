//! Wires the application services to their sockets and runs them.
//!
//! ```text
//! start_bridge()
//!  ├─ SessionManager + DeviceClient     (over the given DeviceApi)
//!  ├─ bootstrap()                       login → groups → registry → warm-up
//!  ├─ SwitchController
//!  ├─ ControlListener  (UDP task)       OSC → controller.dispatch()
//!  └─ StatusServer     (HTTP task)      optional
//! ```
//!
//! Nothing listens for control commands until bootstrap has succeeded.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use tally_core::CommandMatcher;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::device::{DeviceApi, DeviceClient};
use crate::application::session::SessionManager;
use crate::application::startup::bootstrap;
use crate::application::switch_output::SwitchController;
use crate::infrastructure::control_listener::ControlListener;
use crate::infrastructure::status_server::StatusServer;
use crate::infrastructure::storage::config::BridgeConfig;

/// Handles to a started bridge.
pub struct RunningBridge {
    pub control_addr: SocketAddr,
    pub status_addr: Option<SocketAddr>,
    pub controller: Arc<SwitchController>,
    pub session: Arc<SessionManager>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningBridge {
    /// Waits for the listener tasks to exit (after `running` is cleared).
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("bridge task panicked: {e}");
            }
        }
    }
}

/// Bootstraps against `api` and starts the control and status listeners.
///
/// # Errors
///
/// Fails if startup authentication or enumeration fails, or a socket cannot
/// be bound.  No listener is running when this returns an error.
pub async fn start_bridge(
    config: &BridgeConfig,
    api: Arc<dyn DeviceApi>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<RunningBridge> {
    let timeout = config.device.request_timeout();
    let session = Arc::new(SessionManager::new(
        Arc::clone(&api),
        config.device.identity(),
        timeout,
    ));
    let client = DeviceClient::new(api, Arc::clone(&session), timeout);

    let boot = bootstrap(&client, config.control.max_inputs)
        .await
        .context("startup sequence failed")?;
    if boot.warmup.failed.is_empty() {
        info!(warmed = boot.warmup.warmed.len(), "all bound sources registered for preview");
    } else {
        warn!(
            warmed = boot.warmup.warmed.len(),
            failed = ?boot.warmup.failed,
            "some sources could not be registered for preview"
        );
    }

    let controller = Arc::new(SwitchController::new(
        Arc::new(boot.registry),
        client,
        config.control.same_index_policy,
    ));

    // Both sockets are bound before any task is spawned.
    let listener = ControlListener::bind(
        config.control.socket_addr()?,
        CommandMatcher::new(config.control.address_prefix.clone()),
    )
    .await?;
    let status = if config.status.enabled {
        Some(StatusServer::bind(config.status.socket_addr()?).await?)
    } else {
        None
    };

    let control_addr = listener.local_addr();
    let status_addr = status.as_ref().map(StatusServer::local_addr);

    let mut tasks = vec![tokio::spawn(
        listener.run(Arc::clone(&controller), Arc::clone(&running)),
    )];
    if let Some(server) = status {
        let (controller, session, running) =
            (Arc::clone(&controller), Arc::clone(&session), Arc::clone(&running));
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(controller, session, running).await {
                error!("{e}");
            }
        }));
    }

    Ok(RunningBridge {
        control_addr,
        status_addr,
        controller,
        session,
        tasks,
    })
}

/// Starts the bridge and runs it until `running` is cleared.
///
/// # Errors
///
/// As [`start_bridge`].
pub async fn run_bridge(
    config: &BridgeConfig,
    api: Arc<dyn DeviceApi>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let bridge = start_bridge(config, api, Arc::clone(&running)).await?;
    info!(
        control = %bridge.control_addr,
        status = ?bridge.status_addr,
        "bridge ready"
    );
    bridge.join().await;
    running.store(false, Ordering::Relaxed);
    Ok(())
}
