//! Session credential ownership.
//!
//! The [`SessionManager`] holds at most one [`Credential`] at a time.  Every
//! device call reads it through [`SessionManager::current`]; nothing keeps a
//! private copy, so after a re-authentication the very next call uses the new
//! token.
//!
//! Acquisitions are serialized: two tasks that both see an auth failure and
//! both call [`SessionManager::acquire`] perform two logins one after the
//! other, never interleaved, and the slot always ends up holding the token
//! from the most recent successful login.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::device::{AuthError, Credential, DeviceApi, DeviceIdentity};

/// Owns the session credential and the means to (re)acquire it.
pub struct SessionManager {
    api: Arc<dyn DeviceApi>,
    identity: DeviceIdentity,
    timeout: Duration,
    slot: RwLock<Option<Credential>>,
    /// Held for the duration of a login round-trip.
    acquiring: Mutex<()>,
}

impl SessionManager {
    pub fn new(api: Arc<dyn DeviceApi>, identity: DeviceIdentity, timeout: Duration) -> Self {
        Self {
            api,
            identity,
            timeout,
            slot: RwLock::new(None),
            acquiring: Mutex::new(()),
        }
    }

    /// Logs in with the configured identity and stores the new credential.
    ///
    /// On failure the slot is left untouched: an older credential, if any,
    /// stays in place.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] reported by the device, or
    /// [`AuthError::Timeout`] if the login does not finish in time.
    pub async fn acquire(&self) -> Result<Credential, AuthError> {
        let _guard = self.acquiring.lock().await;
        debug!(username = %self.identity.username, "requesting session credential");

        let credential = tokio::time::timeout(self.timeout, self.api.login(&self.identity))
            .await
            .map_err(|_| AuthError::Timeout(self.timeout))
            .and_then(|result| result)
            .map_err(|e| {
                warn!(error = %e, "device login failed");
                e
            })?;

        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        info!("session credential acquired");
        Ok(credential)
    }

    /// Returns the credential currently in the slot.
    ///
    /// # Errors
    ///
    /// [`AuthError::NoCredential`] when no login has succeeded yet or the
    /// credential was invalidated.
    pub fn current(&self) -> Result<Credential, AuthError> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(AuthError::NoCredential)
    }

    /// Empties the slot.  Subsequent calls fail with
    /// [`AuthError::NoCredential`] until the next successful [`acquire`].
    ///
    /// [`acquire`]: SessionManager::acquire
    pub fn invalidate(&self) {
        let previous = self
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            warn!("session credential invalidated");
        }
    }

    pub fn has_credential(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
