//! Node-side state carried across the whole connection lifetime
//! (§4.G): the assigned node id, the clock offset against the server,
//! the scan controller, and the environment info reported at
//! registration.

use crate::scanner::ScanController;
use chrono::{DateTime, Duration, Utc};
use nray_core::EnvironmentInfo;
use parking_lot::RwLock;
use std::sync::Arc;
use sysinfo::System;

/// Shared, mutable node identity. `node_id` and `time_offset` are set
/// once on `RegisteredNode` and refreshed on every re-registration.
pub struct NodeContext {
    pub machine_id: String,
    pub preferred_name: String,
    pub preferred_pool: i32,
    pub env_info: EnvironmentInfo,
    pub controller: Arc<ScanController>,
    node_id: RwLock<Option<String>>,
    time_offset: RwLock<Duration>,
}

impl NodeContext {
    pub fn new(
        machine_id: String,
        preferred_name: String,
        preferred_pool: i32,
        controller: Arc<ScanController>,
    ) -> Self {
        Self {
            machine_id,
            preferred_name,
            preferred_pool,
            env_info: gather_env_info(),
            controller,
            node_id: RwLock::new(None),
            time_offset: RwLock::new(Duration::zero()),
        }
    }

    pub fn node_id(&self) -> Option<String> {
        self.node_id.read().clone()
    }

    pub fn set_node_id(&self, id: String) {
        *self.node_id.write() = Some(id);
    }

    /// `offset = server_clock - local_clock`, applied to all subsequent
    /// locally generated timestamps via `now()`.
    pub fn set_time_offset_from_server_clock(&self, server_clock: DateTime<Utc>) {
        *self.time_offset.write() = server_clock - Utc::now();
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + *self.time_offset.read()
    }
}

fn gather_env_info() -> EnvironmentInfo {
    let mut system = System::new();
    system.refresh_cpu();

    let cpu_model_name = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().to_string())
        .unwrap_or_default();

    let username = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();

    let process_name = std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default();

    EnvironmentInfo {
        hostname: System::host_name().unwrap_or_default(),
        os: System::long_os_version().unwrap_or_default(),
        pid: std::process::id().to_string(),
        process_name,
        username,
        cpu_model_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nray_core::ScannerConfig;

    fn test_context() -> NodeContext {
        let controller = Arc::new(ScanController::new(ScannerConfig::default()));
        NodeContext::new("deadbeef".to_string(), "node-a".to_string(), -1, controller)
    }

    #[test]
    fn node_id_starts_unset() {
        let ctx = test_context();
        assert_eq!(ctx.node_id(), None);
        ctx.set_node_id("node-123".to_string());
        assert_eq!(ctx.node_id(), Some("node-123".to_string()));
    }

    #[test]
    fn time_offset_shifts_now_toward_server_clock() {
        let ctx = test_context();
        let server_clock = Utc::now() + Duration::seconds(3600);
        ctx.set_time_offset_from_server_clock(server_clock);
        let skewed_now = ctx.now();
        assert!((skewed_now - Utc::now()).num_seconds() >= 3599);
    }

    #[test]
    fn env_info_reports_nonempty_pid() {
        let ctx = test_context();
        assert!(!ctx.env_info.pid.is_empty());
    }
}
