//! Host IP detection.
//!
//! The advertised address is the local address the OS would use to reach a
//! public host. Connecting a UDP socket sends no packets.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tokio::net::UdpSocket;
use tracing::debug;

const PROBE_ADDR: &str = "8.8.8.8:80";

/// A detected change of the advertised host address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostIpChange {
    pub previous: Option<String>,
    pub current: String,
}

/// What to do with running servers after the host address changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostIpAction {
    Restart,
    Close,
}

pub async fn detect_host_ip() -> Option<IpAddr> {
    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(e) => {
            debug!("Host IP probe failed to bind: {}", e);
            return None;
        }
    };
    if let Err(e) = socket.connect(PROBE_ADDR).await {
        debug!("Host IP probe failed to connect: {}", e);
        return None;
    }
    socket
        .local_addr()
        .ok()
        .map(|addr| addr.ip())
        .filter(|ip| !ip.is_unspecified())
}

/// Compare `current` against the last known address. The first observation
/// only records the address.
pub(crate) fn compare(last: &mut Option<String>, current: &str) -> Option<HostIpChange> {
    match last.as_deref() {
        Some(previous) if previous == current => None,
        None => {
            *last = Some(current.to_string());
            None
        }
        Some(_) => {
            let previous = last.replace(current.to_string());
            Some(HostIpChange {
                previous,
                current: current.to_string(),
            })
        }
    }
}
