//! Local HTTP status endpoint.
//!
//! - `GET /api/test`   – liveness probe, always `{"message":"Server working"}`.
//! - `GET /api/status` – registry bindings, per-index switch state, the index
//!   currently on program, and whether a session credential is held.
//!
//! The server is read-only; it never triggers device calls.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::application::session::SessionManager;
use crate::application::switch_output::{SameIndexPolicy, SlotStatus, SwitchController};
use crate::infrastructure::control_listener::POLL_INTERVAL;

#[derive(Debug, Error)]
pub enum StatusServerError {
    #[error("failed to bind status server on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("status server failed: {0}")]
    Serve(#[source] std::io::Error),
}

#[derive(Clone)]
struct StatusState {
    controller: Arc<SwitchController>,
    session: Arc<SessionManager>,
}

#[derive(Debug, Serialize)]
struct Liveness {
    message: &'static str,
}

/// One bound tally index.
#[derive(Debug, Clone, Serialize)]
pub struct Binding {
    pub index: u16,
    pub id: String,
    pub name: String,
}

/// Body of `GET /api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub authenticated: bool,
    pub same_index_policy: SameIndexPolicy,
    pub current_program: Option<u16>,
    pub bindings: Vec<Binding>,
    pub slots: Vec<SlotStatus>,
}

impl StatusReport {
    pub fn collect(controller: &SwitchController, session: &SessionManager) -> Self {
        Self {
            authenticated: session.has_credential(),
            same_index_policy: controller.policy(),
            current_program: controller.current_program().map(|i| i.get()),
            bindings: controller
                .registry()
                .bindings()
                .map(|(index, stream)| Binding {
                    index: index.get(),
                    id: stream.id.clone(),
                    name: stream.name.clone(),
                })
                .collect(),
            slots: controller.snapshot(),
        }
    }
}

/// Builds the status router.
pub fn router(controller: Arc<SwitchController>, session: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/api/test", get(liveness))
        .route("/api/status", get(status))
        .with_state(StatusState {
            controller,
            session,
        })
}

async fn liveness() -> Json<Liveness> {
    Json(Liveness {
        message: "Server working",
    })
}

async fn status(State(state): State<StatusState>) -> Json<StatusReport> {
    Json(StatusReport::collect(&state.controller, &state.session))
}

/// Bound status listener, ready to [`run`](StatusServer::run).
pub struct StatusServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl StatusServer {
    /// # Errors
    ///
    /// [`StatusServerError::BindFailed`] if the address is unavailable.
    pub async fn bind(addr: SocketAddr) -> Result<Self, StatusServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StatusServerError::BindFailed { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| StatusServerError::BindFailed { addr, source })?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until `running` is cleared.
    ///
    /// # Errors
    ///
    /// [`StatusServerError::Serve`] if the accept loop fails.
    pub async fn run(
        self,
        controller: Arc<SwitchController>,
        session: Arc<SessionManager>,
        running: Arc<AtomicBool>,
    ) -> Result<(), StatusServerError> {
        info!(addr = %self.local_addr, "status server listening");
        axum::serve(self.listener, router(controller, session))
            .with_graceful_shutdown(stopped(running))
            .await
            .map_err(StatusServerError::Serve)?;
        info!("status server stopped");
        Ok(())
    }
}

/// Resolves once `running` is cleared.
async fn stopped(running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
