//! UDP payload/response scanner (§4.H): send a port-specific probe,
//! wait for any response. No response means closed-or-filtered and is
//! not reported at all (UDP gives no positive "closed" signal without
//! raw-socket ICMP capture, which is out of scope per spec.md §1).

use super::payloads;
use nray_core::{PortScanResult, ScanType};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Send the port's configured probe and wait up to `probe_timeout` for
/// any response. `host` may be a literal address or a DNS name. `fast`
/// skips ports with no known payload rather than sending a contentless
/// probe that rarely elicits a response. Returns `None` for "no result"
/// (skipped, or no response).
pub async fn probe(
    host: &str,
    port: u16,
    probe_timeout: Duration,
    fast: bool,
    overrides: &HashMap<u16, Vec<u8>>,
) -> Option<PortScanResult> {
    let payload = payloads::payload_for(port, overrides);
    if payload.is_none() && fast {
        return None;
    }
    let payload = payload.unwrap_or_default();

    let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect((host, port)).await.ok()?;
    socket.send(&payload).await.ok()?;

    let mut buf = [0u8; 512];
    match timeout(probe_timeout, socket.recv(&mut buf)).await {
        Ok(Ok(_)) => Some(PortScanResult {
            target: host.to_string(),
            port,
            open: true,
            scan_type: ScanType::Udp,
        }),
        _ => None,
    }
}
