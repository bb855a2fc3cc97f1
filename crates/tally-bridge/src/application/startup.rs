//! Startup bootstrap: everything that must succeed before the bridge accepts
//! control commands.
//!
//! ```text
//! authenticate ──► list source groups ──► build registry ──► warm previews
//!     fatal              fatal                                 per-stream,
//!                                                              non-fatal
//! ```
//!
//! Warming stages every bound stream on the preview bus once, in index
//! order, so the device has seen each source before the first live switch.

use tally_core::StreamRegistry;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::device::{AuthError, DeviceClient, DeviceError};

#[derive(Debug, Error)]
pub enum StartupError {
    /// No session could be established.  No enumeration was attempted.
    #[error("device authentication failed: {0}")]
    Authentication(#[source] AuthError),

    /// The source inventory could not be read.
    #[error("source enumeration failed: {0}")]
    Enumeration(#[source] DeviceError),
}

/// Outcome of preview warm-up, by stream id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmupReport {
    pub warmed: Vec<String>,
    pub failed: Vec<String>,
}

/// Result of a successful bootstrap.
#[derive(Debug)]
pub struct Bootstrapped {
    pub registry: StreamRegistry,
    pub warmup: WarmupReport,
}

/// Authenticates, enumerates sources, binds up to `max_inputs` of them, and
/// warms their previews.
///
/// # Errors
///
/// [`StartupError::Authentication`] or [`StartupError::Enumeration`]; the
/// caller must not start serving commands after either.
pub async fn bootstrap(client: &DeviceClient, max_inputs: usize) -> Result<Bootstrapped, StartupError> {
    client
        .session()
        .acquire()
        .await
        .map_err(StartupError::Authentication)?;

    let groups = client
        .list_source_groups()
        .await
        .map_err(StartupError::Enumeration)?;

    let registry = StreamRegistry::build(&groups, max_inputs);
    info!(
        groups = groups.len(),
        bound = registry.len(),
        capacity = registry.capacity(),
        "stream registry built"
    );
    for (index, stream) in registry.bindings() {
        info!(%index, stream = %stream.id, name = %stream.name, "tally index bound");
    }

    let mut warmup = WarmupReport::default();
    for (index, stream) in registry.bindings() {
        match client.set_preview(stream).await {
            Ok(()) => warmup.warmed.push(stream.id.clone()),
            Err(e) => {
                warn!(%index, stream = %stream.id, error = %e, "preview warm-up failed");
                warmup.failed.push(stream.id.clone());
            }
        }
    }

    Ok(Bootstrapped { registry, warmup })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::device::{DeviceApi, DeviceIdentity};
    use crate::application::session::SessionManager;
    use crate::infrastructure::simulated_device::{CallKind, SimulatedDevice};
    use std::sync::Arc;
    use std::time::Duration;
    use tally_core::{SourceGroup, StreamDescriptor};

    fn client_for(device: &Arc<SimulatedDevice>) -> DeviceClient {
        let api: Arc<dyn DeviceApi> = device.clone();
        let session = Arc::new(SessionManager::new(
            Arc::clone(&api),
            DeviceIdentity {
                username: "admin".to_string(),
                password: "admin".to_string(),
            },
            Duration::from_secs(1),
        ));
        DeviceClient::new(api, session, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_bootstrap_binds_enabled_streams_and_warms_them() {
        // Arrange: s2 is disabled
        let device = Arc::new(SimulatedDevice::new(vec![SourceGroup::new(vec![
            StreamDescriptor::new("s1", "Cam 1", "rtsp://1", true),
            StreamDescriptor::new("s2", "Cam 2", "rtsp://2", false),
            StreamDescriptor::new("s3", "Cam 3", "rtsp://3", true),
        ])]));
        let client = client_for(&device);

        // Act
        let boot = bootstrap(&client, 4).await.unwrap();

        // Assert
        assert_eq!(boot.registry.resolve(1).unwrap().id, "s1");
        assert_eq!(boot.registry.resolve(2).unwrap().id, "s3");
        assert!(boot.registry.resolve(3).is_err());
        assert_eq!(boot.warmup.warmed, vec!["s1", "s3"]);
        assert!(boot.warmup.failed.is_empty());
        assert_eq!(device.preview().as_deref(), Some("s3"));
        assert_eq!(device.count(CallKind::SetProgram), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_warms_only_bound_streams() {
        let device = Arc::new(SimulatedDevice::with_demo_sources(6));
        let client = client_for(&device);

        let boot = bootstrap(&client, 4).await.unwrap();

        assert_eq!(boot.registry.len(), 4);
        assert_eq!(device.count(CallKind::SetPreview), 4);
    }

    #[tokio::test]
    async fn test_authentication_failure_is_fatal_and_skips_enumeration() {
        // Arrange
        let device = Arc::new(SimulatedDevice::with_demo_sources(2));
        device.reject_logins(true);
        let client = client_for(&device);

        // Act
        let result = bootstrap(&client, 4).await;

        // Assert
        assert!(matches!(
            result,
            Err(StartupError::Authentication(AuthError::Rejected { status: 401 }))
        ));
        assert_eq!(device.count(CallKind::ListSourceGroups), 0);
    }

    #[tokio::test]
    async fn test_enumeration_failure_is_fatal() {
        let device = Arc::new(SimulatedDevice::with_demo_sources(2));
        device.fail_next(
            CallKind::ListSourceGroups,
            DeviceError::Status {
                status: 500,
                body: String::new(),
            },
        );
        let client = client_for(&device);

        let result = bootstrap(&client, 4).await;

        assert!(matches!(result, Err(StartupError::Enumeration(_))));
        assert_eq!(device.count(CallKind::SetPreview), 0);
    }

    #[tokio::test]
    async fn test_warmup_failure_is_recorded_and_does_not_stop_others() {
        // Arrange: first preview call fails
        let device = Arc::new(SimulatedDevice::with_demo_sources(3));
        device.fail_next(
            CallKind::SetPreview,
            DeviceError::Transport("connection reset".to_string()),
        );
        let client = client_for(&device);

        // Act
        let boot = bootstrap(&client, 4).await.unwrap();

        // Assert
        assert_eq!(boot.warmup.failed, vec!["sim-1"]);
        assert_eq!(boot.warmup.warmed, vec!["sim-2", "sim-3"]);
        assert_eq!(boot.registry.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_inventory_still_boots() {
        let device = Arc::new(SimulatedDevice::new(Vec::new()));
        let client = client_for(&device);

        let boot = bootstrap(&client, 4).await.unwrap();

        assert!(boot.registry.is_empty());
        assert_eq!(boot.warmup, WarmupReport::default());
    }
}
