//! Event types carried over the wire and handed to sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observation emitted by a node: environment info at registration,
/// a raw port-scan result, or a higher-level protocol-scan result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub node_id: String,
    pub node_name: String,
    pub scanner_name: String,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(node_id: impl Into<String>, node_name: impl Into<String>, data: EventData) -> Self {
        Self {
            node_id: node_id.into(),
            node_name: node_name.into(),
            scanner_name: "nray".to_string(),
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Tagged payload of an `Event`. Externally tagged so the `data_type`
/// discriminant round-trips as a plain string over JSON sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "data_type", rename_all = "snake_case")]
pub enum EventData {
    EnvironmentInfo(crate::types::EnvironmentInfo),
    PortScanResult(PortScanResult),
    ProtocolScanResult(ProtocolScanResult),
}

/// The scan type a probe used, as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    TcpConnect,
    Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortScanResult {
    pub target: String,
    pub port: u16,
    pub open: bool,
    pub scan_type: ScanType,
}

/// Result from a higher-level protocol scanner (SSH, HTTP, ...) that
/// subscribed to a port-scan `Open` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolScanResult {
    pub target: String,
    pub port: u16,
    pub protocol: String,
    pub data: serde_json::Value,
}
