//! nray-core — shared data model, config, and wire types for nray-rs.
//!
//! Leaves-first crate: address-space enumeration, port parsing, the
//! blacklist, the `AnyTargets`/`Job`/`Node` data model, config, errors,
//! event and wire message types. No async runtime dependency lives
//! here; it's pulled in by `nray-server`/`nray-node`/`nray-targetgen`.

pub mod blacklist;
pub mod config;
pub mod enumerator;
pub mod error;
pub mod event;
pub mod ports;
pub mod types;
pub mod wire;

pub use blacklist::Blacklist;
pub use config::{PoolConfig, ScannerConfig, ServerConfig, TargetGeneratorConfig, TlsConfig};
pub use enumerator::{enumerate, AddressEnumerator};
pub use error::{Error, Result};
pub use event::{Event, EventData, PortScanResult, ProtocolScanResult, ScanType};
pub use ports::{parse as parse_ports, top_ports, Protocol as PortProtocol};
pub use types::{AnyTargets, EnvironmentInfo, Job, JobState, Node};
pub use wire::{NodeMessage, ServerMessage};
