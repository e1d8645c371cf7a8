//! Core data model: scan targets, jobs, and nodes
//!
//! These types are deliberately plain data — the arena + stable-id
//! discipline from the design notes means `Job` and `Node` never hold
//! references to each other or to the pool that owns them. Server-side
//! bookkeeping (locking, assignment, eviction) lives in `nray-server`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// One work unit as exchanged over the wire: a batch of hosts paired
/// with the TCP/UDP ports to probe on each of them.
///
/// Invariant: port numbers are in `1..=65535`; a batch never has both
/// port lists empty at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnyTargets {
    pub hosts: Vec<String>,
    pub tcp_ports: Vec<u16>,
    pub udp_ports: Vec<u16>,
}

impl AnyTargets {
    pub fn new(hosts: Vec<String>, tcp_ports: Vec<u16>, udp_ports: Vec<u16>) -> Self {
        Self {
            hosts,
            tcp_ports,
            udp_ports,
        }
    }

    /// `|hosts| * (|tcp| + |udp|)` — the number of individual probes this batch represents.
    pub fn target_count(&self) -> u64 {
        self.hosts.len() as u64 * (self.tcp_ports.len() + self.udp_ports.len()) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() || (self.tcp_ports.is_empty() && self.udp_ports.is_empty())
    }
}

/// State of a `Job` in a pool's job area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Waiting,
    InProgress,
}

/// Server-side wrapper around one `AnyTargets` batch.
///
/// Invariant: `state == InProgress` iff `assigned_node_id` is `Some`.
/// A job leaves a pool's job area only via `removeJob` (success) or is
/// reset to `Waiting` with `assigned_node_id = None` on forced eviction
/// of its assignee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub targets: AnyTargets,
    pub state: JobState,
    pub assigned_node_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Retained per the original design's unused field; no eviction
    /// policy reads it yet (see DESIGN.md open question on job timeouts).
    pub timed_out_counter: u32,
}

/// Process-wide atomic counter backing `Job::id` allocation.
static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

impl Job {
    /// Wrap a freshly produced batch in a new `Waiting` job with a
    /// monotonically increasing id.
    pub fn new(targets: AnyTargets) -> Self {
        Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            targets,
            state: JobState::Waiting,
            assigned_node_id: None,
            created_at: Utc::now(),
            timed_out_counter: 0,
        }
    }

    pub fn is_assigned_to(&self, node_id: &str) -> bool {
        self.assigned_node_id.as_deref() == Some(node_id)
    }

    pub fn assign(&mut self, node_id: &str) {
        self.assigned_node_id = Some(node_id.to_string());
        self.state = JobState::InProgress;
    }

    /// Reset to `Waiting` with no assignee — the forced-removal path.
    pub fn reset(&mut self) {
        self.assigned_node_id = None;
        self.state = JobState::Waiting;
    }
}

/// Environment info a node reports at registration time, re-emitted to
/// sinks as an `environment_info` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub hostname: String,
    pub os: String,
    pub pid: String,
    pub process_name: String,
    pub username: String,
    pub cpu_model_name: String,
}

/// Server-side record of one registered scanner.
///
/// Lives inside exactly one pool's node table. `should_stop` is set by
/// the terminal-detection loop or by signal-driven graceful drain;
/// `scan_paused` reflects the node's last heartbeat-ack pause state as
/// tracked server-side for display purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub env_info: EnvironmentInfo,
    pub last_heartbeat: DateTime<Utc>,
    pub scan_paused: bool,
    pub should_stop: bool,
}

impl Node {
    pub fn new(id: String, name: String, env_info: EnvironmentInfo, registered_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            env_info,
            last_heartbeat: registered_at,
            scan_paused: false,
            should_stop: false,
        }
    }
}
