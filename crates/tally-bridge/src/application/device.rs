//! Device client: typed access to the switcher's four operations.
//!
//! The switcher is only reachable through an authenticated HTTP API.  This
//! module splits that access into two pieces:
//!
//! - [`DeviceApi`] – the transport seam.  It takes the credential explicitly
//!   on every call and knows nothing about where the credential came from.
//!   The infrastructure layer implements it over HTTP; tests implement it in
//!   memory.
//! - [`DeviceClient`] – what the rest of the application uses.  It reads the
//!   *current* credential from the [`SessionManager`] at call time, attaches
//!   it, and bounds the call with a timeout.
//!
//! ```text
//! SwitchController ──► DeviceClient ──► DeviceApi (HTTP) ──► switcher
//!                           │
//!                           └── SessionManager::current()
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tally_core::{SourceGroup, StreamDescriptor};
use thiserror::Error;

use crate::application::session::SessionManager;

// ── Credential and identity ───────────────────────────────────────────────────

/// Opaque bearer token authorizing device API calls.
///
/// `Debug` output never contains the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for attaching to an outbound request.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Login identity configured for the device.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Credential acquisition or rejection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No credential has been acquired, or it was invalidated.
    #[error("no session credential available")]
    NoCredential,

    /// The device refused the identity or the presented credential.
    #[error("device rejected authentication (HTTP {status})")]
    Rejected { status: u16 },

    /// The login endpoint answered with a non-success status other than a
    /// rejection.
    #[error("login failed with HTTP {status}")]
    Status { status: u16 },

    /// The login request never produced a response.
    #[error("login request failed: {0}")]
    Transport(String),

    /// The login request did not complete within the configured bound.
    #[error("login timed out after {0:?}")]
    Timeout(Duration),

    /// The login response did not contain an extractable token.
    #[error("malformed login response: {0}")]
    MalformedResponse(String),
}

/// Failure of a credentialed device call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// The credential was absent or the device rejected it.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Network-level failure (connection refused, reset, DNS…).
    #[error("device request failed: {0}")]
    Transport(String),

    /// The call did not complete within the configured bound.
    #[error("device request timed out after {0:?}")]
    Timeout(Duration),

    /// The device answered with a non-success status.
    #[error("device returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be interpreted.
    #[error("malformed device response: {0}")]
    MalformedResponse(String),
}

impl DeviceError {
    /// `true` when re-authenticating might make a retry succeed.
    pub fn is_auth(&self) -> bool {
        matches!(self, DeviceError::Auth(_))
    }
}

// ── Transport seam ────────────────────────────────────────────────────────────

/// The switcher's operations, with the credential passed per call.
///
/// Infrastructure implementations speak HTTP; test implementations record
/// calls and inject failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Exchanges the configured identity for a fresh credential.
    async fn login(&self, identity: &DeviceIdentity) -> Result<Credential, AuthError>;

    /// Enumerates the device's source groups, streams included.
    async fn list_source_groups(
        &self,
        credential: &Credential,
    ) -> Result<Vec<SourceGroup>, DeviceError>;

    /// Stages `stream` as both the "from" and "to" preview source of the
    /// bridge's output slot.  Idempotent.
    async fn set_preview(
        &self,
        credential: &Credential,
        stream: &StreamDescriptor,
    ) -> Result<(), DeviceError>;

    /// Commits `stream` as the program source of the bridge's output slot.
    async fn set_program(
        &self,
        credential: &Credential,
        stream: &StreamDescriptor,
    ) -> Result<(), DeviceError>;
}

/// The two mutation phases of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchPhase {
    Preview,
    Program,
}

impl fmt::Display for SwitchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchPhase::Preview => f.write_str("preview"),
            SwitchPhase::Program => f.write_str("program"),
        }
    }
}

// ── DeviceClient ──────────────────────────────────────────────────────────────

/// Credential-attaching, time-bounded wrapper around a [`DeviceApi`].
pub struct DeviceClient {
    api: Arc<dyn DeviceApi>,
    session: Arc<SessionManager>,
    timeout: Duration,
}

impl DeviceClient {
    pub fn new(api: Arc<dyn DeviceApi>, session: Arc<SessionManager>, timeout: Duration) -> Self {
        Self {
            api,
            session,
            timeout,
        }
    }

    /// The session whose credential this client attaches.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// # Errors
    ///
    /// [`DeviceError::Auth`] with [`AuthError::NoCredential`] if no session is
    /// established; otherwise whatever the device call fails with.
    pub async fn list_source_groups(&self) -> Result<Vec<SourceGroup>, DeviceError> {
        let credential = self.session.current()?;
        self.bounded(self.api.list_source_groups(&credential)).await
    }

    pub async fn set_preview(&self, stream: &StreamDescriptor) -> Result<(), DeviceError> {
        let credential = self.session.current()?;
        self.bounded(self.api.set_preview(&credential, stream)).await
    }

    pub async fn set_program(&self, stream: &StreamDescriptor) -> Result<(), DeviceError> {
        let credential = self.session.current()?;
        self.bounded(self.api.set_program(&credential, stream)).await
    }

    /// Runs one switch phase against `stream`.
    pub async fn apply(
        &self,
        phase: SwitchPhase,
        stream: &StreamDescriptor,
    ) -> Result<(), DeviceError> {
        match phase {
            SwitchPhase::Preview => self.set_preview(stream).await,
            SwitchPhase::Program => self.set_program(stream).await,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, DeviceError>>,
    ) -> Result<T, DeviceError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| DeviceError::Timeout(self.timeout))?
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::always;

    fn stream() -> StreamDescriptor {
        StreamDescriptor::new("s1", "Cam 1", "rtsp://cam1", true)
    }

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        }
    }

    async fn client_with(mock: MockDeviceApi, timeout: Duration) -> DeviceClient {
        let api: Arc<dyn DeviceApi> = Arc::new(mock);
        let session = Arc::new(SessionManager::new(
            Arc::clone(&api),
            identity(),
            Duration::from_secs(1),
        ));
        session.acquire().await.expect("login must succeed");
        DeviceClient::new(api, session, timeout)
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("secret-token");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn test_identity_debug_hides_password() {
        let rendered = format!("{:?}", identity());
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_only_auth_errors_are_auth() {
        assert!(DeviceError::Auth(AuthError::Rejected { status: 401 }).is_auth());
        assert!(DeviceError::from(AuthError::NoCredential).is_auth());
        assert!(!DeviceError::Timeout(Duration::from_secs(1)).is_auth());
        assert!(!DeviceError::Status {
            status: 500,
            body: String::new()
        }
        .is_auth());
    }

    #[test]
    fn test_switch_phase_display() {
        assert_eq!(SwitchPhase::Preview.to_string(), "preview");
        assert_eq!(SwitchPhase::Program.to_string(), "program");
    }

    #[tokio::test]
    async fn test_calls_carry_the_current_credential() {
        // Arrange
        let mut mock = MockDeviceApi::new();
        mock.expect_login()
            .times(1)
            .returning(|_| Ok(Credential::new("tok-1")));
        mock.expect_set_preview()
            .withf(|cred, s| cred.expose() == "tok-1" && s.id == "s1")
            .times(1)
            .returning(|_, _| Ok(()));
        let client = client_with(mock, Duration::from_secs(1)).await;

        // Act
        let result = client.set_preview(&stream()).await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_call_without_credential_fails_explicitly() {
        // Arrange: no login performed, device must never be called
        let mut mock = MockDeviceApi::new();
        mock.expect_set_program().never();
        let api: Arc<dyn DeviceApi> = Arc::new(mock);
        let session = Arc::new(SessionManager::new(
            Arc::clone(&api),
            identity(),
            Duration::from_secs(1),
        ));
        let client = DeviceClient::new(api, session, Duration::from_secs(1));

        // Act
        let result = client.set_program(&stream()).await;

        // Assert
        assert_eq!(result, Err(DeviceError::Auth(AuthError::NoCredential)));
    }

    #[tokio::test]
    async fn test_apply_dispatches_to_matching_operation() {
        let mut mock = MockDeviceApi::new();
        mock.expect_login()
            .returning(|_| Ok(Credential::new("tok")));
        mock.expect_set_preview().never();
        mock.expect_set_program()
            .with(always(), always())
            .times(1)
            .returning(|_, _| Ok(()));
        let client = client_with(mock, Duration::from_secs(1)).await;

        client.apply(SwitchPhase::Program, &stream()).await.unwrap();
    }

    #[tokio::test]
    async fn test_device_errors_pass_through_unchanged() {
        let mut mock = MockDeviceApi::new();
        mock.expect_login()
            .returning(|_| Ok(Credential::new("tok")));
        mock.expect_list_source_groups().returning(|_| {
            Err(DeviceError::Status {
                status: 503,
                body: "busy".to_string(),
            })
        });
        let client = client_with(mock, Duration::from_secs(1)).await;

        let result = client.list_source_groups().await;

        assert_eq!(
            result,
            Err(DeviceError::Status {
                status: 503,
                body: "busy".to_string()
            })
        );
    }
}
