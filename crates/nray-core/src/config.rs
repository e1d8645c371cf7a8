//! Typed configuration, loaded from TOML.
//!
//! Mirrors the original's Viper config tree (`pools`, `targetgenerator`,
//! `scannerconfig`, `events.*`) structurally, but as typed structs
//! instead of a stringly-keyed map.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: ListenConfig,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default = "default_pool")]
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub events: EventsConfig,
}

fn default_pool() -> Vec<PoolConfig> {
    vec![PoolConfig::default()]
}

impl ServerConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {path:?}: {e}")))?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen.endpoints.is_empty() {
            return Err(Error::Config("listen.endpoints must not be empty".into()));
        }
        if self.pools.is_empty() {
            return Err(Error::Config("at least one pool must be configured".into()));
        }
        for pool in &self.pools {
            pool.targetgenerator.validate()?;
        }
        if let Some(tls) = &self.tls {
            tls.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    pub endpoints: Vec<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["0.0.0.0:7777".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
    #[serde(default)]
    pub client_ca_path: Option<String>,
    #[serde(default)]
    pub require_client_cert: bool,
}

impl TlsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cert_path.is_empty() || self.key_path.is_empty() {
            return Err(Error::Config("tls cert_path/key_path must be set".into()));
        }
        if self.require_client_cert && self.client_ca_path.is_none() {
            return Err(Error::Config(
                "require_client_cert needs client_ca_path".into(),
            ));
        }
        Ok(())
    }
}

/// One pool's policy: node admission rules, target generation, and the
/// scanner config handed to nodes that register into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_true")]
    pub allow_multiple_per_host: bool,
    #[serde(default = "default_true")]
    pub consider_client_pool_preference: bool,
    #[serde(default = "default_expiry_check_interval")]
    pub expiry_check_interval_secs: u64,
    #[serde(default = "default_expiry_time")]
    pub expiry_time_secs: u64,
    #[serde(default = "default_min_waiting_jobs")]
    pub min_waiting_jobs: usize,
    pub targetgenerator: TargetGeneratorConfig,
    #[serde(default)]
    pub scannerconfig: ScannerConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            allow_multiple_per_host: default_true(),
            consider_client_pool_preference: default_true(),
            expiry_check_interval_secs: default_expiry_check_interval(),
            expiry_time_secs: default_expiry_time(),
            min_waiting_jobs: default_min_waiting_jobs(),
            targetgenerator: TargetGeneratorConfig::default(),
            scannerconfig: ScannerConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_expiry_check_interval() -> u64 {
    10
}
fn default_expiry_time() -> u64 {
    30
}
fn default_min_waiting_jobs() -> usize {
    50
}

/// Target-generation parameters shared across all backends (§4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetGeneratorConfig {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub targets_file: Option<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub tcp_ports: Vec<String>,
    #[serde(default)]
    pub udp_ports: Vec<String>,
    #[serde(default = "default_max_hosts")]
    pub max_hosts_per_batch: usize,
    #[serde(default = "default_max_ports")]
    pub max_tcp_ports_per_batch: usize,
    #[serde(default = "default_max_ports")]
    pub max_udp_ports_per_batch: usize,
    #[serde(default)]
    pub certificate_transparency: Option<CertificateTransparencyConfig>,
    #[serde(default)]
    pub directory: Option<DirectoryBackendConfig>,
    #[serde(default = "default_buffer_size")]
    pub multiplexer_buffer_size: usize,
}

impl Default for TargetGeneratorConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            targets_file: None,
            blacklist: Vec::new(),
            tcp_ports: Vec::new(),
            udp_ports: Vec::new(),
            max_hosts_per_batch: default_max_hosts(),
            max_tcp_ports_per_batch: default_max_ports(),
            max_udp_ports_per_batch: default_max_ports(),
            certificate_transparency: None,
            directory: None,
            multiplexer_buffer_size: default_buffer_size(),
        }
    }
}

impl TargetGeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_hosts_per_batch == 0 {
            return Err(Error::Config("max_hosts_per_batch must be > 0".into()));
        }
        if self.max_tcp_ports_per_batch == 0 && self.max_udp_ports_per_batch == 0 {
            return Err(Error::Config(
                "at least one of max_tcp_ports_per_batch/max_udp_ports_per_batch must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_hosts() -> usize {
    256
}
fn default_max_ports() -> usize {
    128
}
fn default_buffer_size() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateTransparencyConfig {
    pub stream_url: String,
    pub domain_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryBackendConfig {
    pub search_base: String,
    pub filter: String,
    pub attribute: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    100
}

/// Scanner behavior handed down to nodes that register into a pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default)]
    pub rate_limit: RateLimit,
    #[serde(default = "default_tcp_timeout_ms")]
    pub tcp_timeout_ms: u64,
    #[serde(default = "default_udp_timeout_ms")]
    pub udp_timeout_ms: u64,
    #[serde(default)]
    pub fast_udp: bool,
    /// Per-port UDP probe payload overrides, hex-encoded (e.g.
    /// `{161 = "300e..."}`), taking priority over the built-in table.
    #[serde(default)]
    pub udp_payload_overrides: std::collections::HashMap<u16, String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            rate_limit: RateLimit::default(),
            tcp_timeout_ms: default_tcp_timeout_ms(),
            udp_timeout_ms: default_udp_timeout_ms(),
            fast_udp: false,
            udp_payload_overrides: Default::default(),
        }
    }
}

impl ScannerConfig {
    /// Decode `udp_payload_overrides` into raw bytes, skipping (and
    /// logging) any entry whose value is not valid hex.
    pub fn decoded_udp_overrides(&self) -> std::collections::HashMap<u16, Vec<u8>> {
        self.udp_payload_overrides
            .iter()
            .filter_map(|(port, hex)| match decode_hex(hex) {
                Ok(bytes) => Some((*port, bytes)),
                Err(_) => {
                    tracing::warn!(port, hex, "invalid hex in udp_payload_overrides, skipping");
                    None
                }
            })
            .collect()
    }
}

fn decode_hex(s: &str) -> std::result::Result<Vec<u8>, std::num::ParseIntError> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..(i + 2).min(s.len())], 16))
        .collect()
}

fn default_worker_pool_size() -> usize {
    250
}
fn default_tcp_timeout_ms() -> u64 {
    2500
}
fn default_udp_timeout_ms() -> u64 {
    2500
}

/// Token-bucket rate in events/second; `None` means unbounded ("none").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RateLimit(pub Option<u32>);

/// Sink configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default)]
    pub terminal: Option<TerminalSinkConfig>,
    #[serde(default)]
    pub file: Option<FileSinkConfig>,
    #[serde(default)]
    pub indexer: Option<IndexerSinkConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalSinkConfig {
    #[serde(default)]
    pub filter: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSinkConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
    #[serde(default = "default_fsync_interval")]
    pub fsync_interval_secs: u64,
    #[serde(default)]
    pub filter: std::collections::HashMap<String, String>,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            fsync_interval_secs: default_fsync_interval(),
            filter: Default::default(),
        }
    }
}

fn default_output_path() -> String {
    "nray-output.json".to_string()
}
fn default_fsync_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSinkConfig {
    pub endpoint: String,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    #[serde(default)]
    pub filter: std::collections::HashMap<String, String>,
}

fn default_flush_interval() -> u64 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTlsConfig {
    #[serde(default)]
    pub ca_path: Option<String>,
    #[serde(default)]
    pub client_cert_path: Option<String>,
    #[serde(default)]
    pub client_key_path: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default)]
    pub server_san_override: Option<String>,
}
