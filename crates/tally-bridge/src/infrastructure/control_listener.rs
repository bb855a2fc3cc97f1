//! UDP listener for inbound OSC control commands.
//!
//! Each datagram carries one OSC packet.  The listener decodes it, picks out
//! every "set input N" message (bundles may carry several), and hands each
//! index to [`SwitchController::dispatch`].  Dispatch spawns the switch, so
//! the receive loop is never held up by device round-trips.
//!
//! The channel is unauthenticated and one-way.  Anything that does not decode
//! or does not match is logged at debug level and dropped; there is nobody to
//! reply to.
//!
//! # Shutdown
//!
//! Each `recv_from` is bounded by [`POLL_INTERVAL`].  On every timeout the
//! loop re-checks the shared `running` flag and exits once it is cleared.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tally_core::{decode_packet, CommandMatcher, ControlCommand};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, error, info};

use crate::application::switch_output::SwitchController;

/// Upper bound on one blocking receive before the running flag is re-checked.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Receive buffer size; larger datagrams are truncated by the OS and then
/// fail to decode.
const MAX_DATAGRAM: usize = 8192;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind control socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Bound control socket, ready to [`run`](ControlListener::run).
pub struct ControlListener {
    socket: UdpSocket,
    matcher: CommandMatcher,
    local_addr: SocketAddr,
}

impl ControlListener {
    /// Binds the control socket.  Port 0 picks a free port; see
    /// [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// [`ListenerError::BindFailed`] if the address is unavailable.
    pub async fn bind(addr: SocketAddr, matcher: CommandMatcher) -> Result<Self, ListenerError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ListenerError::BindFailed { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| ListenerError::BindFailed { addr, source })?;
        Ok(Self {
            socket,
            matcher,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receives datagrams until `running` is cleared.
    pub async fn run(self, controller: Arc<SwitchController>, running: Arc<AtomicBool>) {
        info!(
            addr = %self.local_addr,
            prefix = %self.matcher.prefix(),
            "control listener ready"
        );
        let mut buf = vec![0u8; MAX_DATAGRAM];

        while running.load(Ordering::Relaxed) {
            let (len, peer) =
                match tokio::time::timeout(POLL_INTERVAL, self.socket.recv_from(&mut buf)).await {
                    Err(_) => continue,
                    Ok(Ok(pair)) => pair,
                    Ok(Err(e)) => {
                        back_off(&e).await;
                        continue;
                    }
                };

            for ControlCommand::SetInput(index) in commands_in(&buf[..len], &self.matcher, peer) {
                info!(%peer, index, "set input command received");
                controller.dispatch(i64::from(index));
            }
        }

        info!("control listener stopped");
    }
}

/// Logs a receive error and waits one poll interval before the next receive.
async fn back_off(err: &std::io::Error) {
    error!("control recv error: {err}");
    tokio::time::sleep(POLL_INTERVAL).await;
}

/// Extracts the control commands carried by one datagram, in wire order.
pub fn commands_in(datagram: &[u8], matcher: &CommandMatcher, peer: SocketAddr) -> Vec<ControlCommand> {
    let packet = match decode_packet(datagram) {
        Ok(packet) => packet,
        Err(e) => {
            debug!(%peer, len = datagram.len(), "dropping undecodable datagram: {e}");
            return Vec::new();
        }
    };

    packet
        .messages()
        .into_iter()
        .filter_map(|msg| {
            let command = matcher.parse(msg);
            if command.is_none() {
                debug!(%peer, address = %msg.address, "ignoring unrecognised OSC message");
            }
            command
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
