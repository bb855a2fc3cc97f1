//! End-to-end tests for the whole bridge over real sockets.
//!
//! # Purpose
//!
//! These tests start the bridge with [`start_bridge`] exactly as the binary
//! does, but against the in-memory [`SimulatedDevice`], and drive it by
//! sending OSC datagrams to its UDP control port.  They verify:
//!
//! - both command spellings (index in the address, index as an argument)
//!   switch the program output;
//! - a bundle carrying several commands is handled message by message;
//! - malformed datagrams and out-of-range indices are dropped without
//!   stopping the listener;
//! - the status endpoint reflects the outcome;
//! - nothing listens when startup authentication or a bind fails.
//!
//! ```text
//! test ──UDP/OSC──▶ ControlListener ─▶ SwitchController ─▶ SimulatedDevice
//!      ◀──HTTP────  StatusServer  (GET /api/status)
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use tally_bridge::application::device::DeviceApi;
use tally_bridge::infrastructure::runner::{start_bridge, RunningBridge};
use tally_bridge::infrastructure::simulated_device::{CallKind, SimulatedDevice};
use tally_bridge::infrastructure::storage::config::{parse_config, BridgeConfig};
use tally_core::protocol::codec::encode_packet;
use tally_core::protocol::messages::{OscBundle, TIMETAG_IMMEDIATE};
use tally_core::{encode_message, OscArg, OscMessage, OscPacket};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn config(status_enabled: bool) -> BridgeConfig {
    parse_config(&format!(
        r#"
[device]
address = "simulated"
username = "admin"
password = "admin"
request_timeout_ms = 1000

[control]
bind_address = "127.0.0.1"
port = 0
max_inputs = 4

[status]
enabled = {status_enabled}
bind_address = "127.0.0.1"
port = 0
"#
    ))
    .unwrap()
}

async fn start(
    sources: usize,
    status_enabled: bool,
) -> (RunningBridge, Arc<SimulatedDevice>, Arc<AtomicBool>) {
    let device = Arc::new(SimulatedDevice::with_demo_sources(sources));
    let api: Arc<dyn DeviceApi> = Arc::clone(&device) as Arc<dyn DeviceApi>;
    let running = Arc::new(AtomicBool::new(true));
    let bridge = start_bridge(&config(status_enabled), api, Arc::clone(&running))
        .await
        .unwrap();
    (bridge, device, running)
}

async fn send(to: SocketAddr, datagram: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(datagram, to).await.unwrap();
}

fn set_input(index: u32) -> Vec<u8> {
    encode_message(&OscMessage::new(format!("/kiloview/setInput/{index}"), vec![]))
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn stop(bridge: RunningBridge, running: Arc<AtomicBool>) {
    running.store(false, Ordering::Relaxed);
    bridge.join().await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_startup_warms_bound_sources_before_listening() {
    // Arrange / Act: six sources, four tally slots.
    let (bridge, device, running) = start(6, false).await;

    // Assert
    assert_eq!(device.count(CallKind::Login), 1);
    assert_eq!(device.count(CallKind::ListSourceGroups), 1);
    assert_eq!(device.count(CallKind::SetPreview), 4);
    assert_eq!(device.count(CallKind::SetProgram), 0);
    assert_eq!(bridge.controller.registry().len(), 4);
    assert!(bridge.status_addr.is_none());

    stop(bridge, running).await;
}

#[tokio::test]
async fn test_index_in_address_switches_program() {
    // Arrange
    let (bridge, device, running) = start(4, false).await;

    // Act
    send(bridge.control_addr, &set_input(3)).await;

    // Assert
    assert!(wait_for(|| device.program().as_deref() == Some("sim-3")).await);
    assert_eq!(device.preview().as_deref(), Some("sim-3"));

    stop(bridge, running).await;
}

#[tokio::test]
async fn test_index_as_argument_switches_program() {
    let (bridge, device, running) = start(4, false).await;

    let datagram = encode_message(&OscMessage::new(
        "/kiloview/setInput",
        vec![OscArg::Int(2)],
    ));
    send(bridge.control_addr, &datagram).await;

    assert!(wait_for(|| device.program().as_deref() == Some("sim-2")).await);

    stop(bridge, running).await;
}

#[tokio::test]
async fn test_bundle_commands_are_each_dispatched() {
    // Arrange
    let (bridge, device, running) = start(4, false).await;
    let bundle = OscPacket::Bundle(OscBundle {
        timetag: TIMETAG_IMMEDIATE,
        content: vec![
            OscPacket::Message(OscMessage::new("/kiloview/setInput/1", vec![])),
            OscPacket::Message(OscMessage::new("/other/address", vec![])),
            OscPacket::Message(OscMessage::new("/kiloview/setInput/4", vec![])),
        ],
    });

    // Act
    send(bridge.control_addr, &encode_packet(&bundle)).await;

    // Assert: two switches, each a preview and a program call.
    assert!(wait_for(|| device.count(CallKind::SetProgram) == 2).await);
    let programmed: Vec<String> = device
        .calls()
        .into_iter()
        .filter(|c| c.kind == CallKind::SetProgram)
        .filter_map(|c| c.stream_id)
        .collect();
    assert!(programmed.contains(&"sim-1".to_string()));
    assert!(programmed.contains(&"sim-4".to_string()));

    stop(bridge, running).await;
}

#[tokio::test]
async fn test_junk_and_unbound_indices_are_dropped() {
    // Arrange
    let (bridge, device, running) = start(2, false).await;

    // Act: garbage, an index past the bound sources, then a good command.
    send(bridge.control_addr, b"not osc at all").await;
    send(bridge.control_addr, &set_input(3)).await;
    send(bridge.control_addr, &set_input(99)).await;
    send(bridge.control_addr, &set_input(1)).await;

    // Assert: only the good command reached the device.
    assert!(wait_for(|| device.program().as_deref() == Some("sim-1")).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(device.count(CallKind::SetProgram), 1);

    stop(bridge, running).await;
}

#[tokio::test]
async fn test_status_endpoint_reports_switch_outcome() {
    // Arrange
    let (bridge, device, running) = start(3, true).await;
    let status_addr = bridge.status_addr.unwrap();
    send(bridge.control_addr, &set_input(2)).await;
    assert!(wait_for(|| device.program().as_deref() == Some("sim-2")).await);

    // Act
    let report: serde_json::Value = reqwest::get(format!("http://{status_addr}/api/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Assert
    assert_eq!(report["authenticated"], true);
    assert_eq!(report["current_program"], 2);
    assert_eq!(report["bindings"].as_array().unwrap().len(), 3);
    assert_eq!(report["slots"][1]["state"], "done");

    stop(bridge, running).await;
}

#[tokio::test]
async fn test_rejected_startup_login_leaves_nothing_listening() {
    // Arrange
    let device = Arc::new(SimulatedDevice::with_demo_sources(2));
    device.reject_logins(true);
    let api: Arc<dyn DeviceApi> = Arc::clone(&device) as Arc<dyn DeviceApi>;

    // Act
    let result = start_bridge(&config(true), api, Arc::new(AtomicBool::new(true))).await;

    // Assert
    let err = result.err().expect("startup must fail");
    assert!(format!("{err:#}").contains("startup sequence failed"));
    assert_eq!(device.count(CallKind::ListSourceGroups), 0);
    assert_eq!(device.count(CallKind::SetPreview), 0);
}

#[tokio::test]
async fn test_status_port_in_use_leaves_control_port_free() {
    // Arrange: pick a free UDP port for control and occupy the status port.
    let control_port = {
        let scratch = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        scratch.local_addr().unwrap().port()
    };
    let held = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut cfg = config(true);
    cfg.control.port = control_port;
    cfg.status.port = held.local_addr().unwrap().port();
    let device = Arc::new(SimulatedDevice::with_demo_sources(2));
    let api: Arc<dyn DeviceApi> = Arc::clone(&device) as Arc<dyn DeviceApi>;

    // Act
    let result = start_bridge(&cfg, api, Arc::new(AtomicBool::new(true))).await;

    // Assert: startup failed and no control socket outlived it.
    assert!(result.is_err());
    let rebound = UdpSocket::bind(("127.0.0.1", control_port)).await;
    assert!(rebound.is_ok(), "control port still held: {rebound:?}");
    assert_eq!(device.count(CallKind::SetProgram), 0);
}

#[tokio::test]
async fn test_listener_stops_when_running_is_cleared() {
    // Arrange
    let (bridge, _device, running) = start(1, true).await;

    // Act
    running.store(false, Ordering::Relaxed);

    // Assert: both tasks exit within a few poll intervals.
    tokio::time::timeout(Duration::from_secs(2), bridge.join())
        .await
        .expect("bridge tasks did not stop");
}
