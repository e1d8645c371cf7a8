//! Request/reply message types exchanged between nodes and the server.
//!
//! Externally tagged (serde's default enum representation) so each
//! variant carries exactly one discriminant, matching the tag table
//! the wire contract specifies. `nray-proto` frames these with
//! `LengthDelimitedCodec` and serializes them with `bincode`.

use crate::event::Event;
use crate::types::AnyTargets;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Messages a node sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeMessage {
    NodeRegister {
        machine_id: String,
        preferred_name: String,
        preferred_pool: i32,
        env_info: Event,
    },
    Heartbeat {
        node_id: String,
        beat_time: DateTime<Utc>,
    },
    MoreWorkRequest {
        node_id: String,
    },
    WorkDone {
        node_id: String,
        batch_id: u64,
        events: Vec<Event>,
    },
    Goodbye {
        node_id: String,
    },
}

impl NodeMessage {
    /// Server dispatch exempts only `NodeRegister` from the "node
    /// must already be registered" check.
    pub fn is_register(&self) -> bool {
        matches!(self, NodeMessage::NodeRegister { .. })
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            NodeMessage::NodeRegister { .. } => None,
            NodeMessage::Heartbeat { node_id, .. }
            | NodeMessage::MoreWorkRequest { node_id }
            | NodeMessage::WorkDone { node_id, .. }
            | NodeMessage::Goodbye { node_id } => Some(node_id),
        }
    }
}

/// Messages the server sends back to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    RegisteredNode {
        node_id: String,
        server_clock: DateTime<Utc>,
        scanner_config: Option<Vec<u8>>,
    },
    HeartbeatAck {
        running: bool,
        scanning: bool,
    },
    JobBatch {
        batch_id: u64,
        targets: AnyTargets,
    },
    WorkDoneAck,
    GoodbyeAck {
        ok: bool,
    },
    NodeIsUnregistered {
        node_id: String,
    },
}

impl ServerMessage {
    /// `batch_id == 0` means "no work yet, try again" per the wire contract.
    pub fn empty_job_batch() -> Self {
        ServerMessage::JobBatch {
            batch_id: 0,
            targets: AnyTargets::default(),
        }
    }

    pub fn is_empty_job_batch(&self) -> bool {
        matches!(self, ServerMessage::JobBatch { batch_id: 0, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventData;

    #[test]
    fn node_message_exempts_only_register_from_node_id_lookup() {
        let register = NodeMessage::NodeRegister {
            machine_id: "deadbeef".to_string(),
            preferred_name: "node-a".to_string(),
            preferred_pool: -1,
            env_info: Event::new(
                "",
                "node-a",
                EventData::EnvironmentInfo(crate::types::EnvironmentInfo::default()),
            ),
        };
        assert!(register.is_register());
        assert_eq!(register.node_id(), None);

        let heartbeat = NodeMessage::Heartbeat {
            node_id: "abc123".to_string(),
            beat_time: Utc::now(),
        };
        assert!(!heartbeat.is_register());
        assert_eq!(heartbeat.node_id(), Some("abc123"));
    }

    #[test]
    fn empty_job_batch_round_trips_through_bincode() {
        let msg = ServerMessage::empty_job_batch();
        assert!(msg.is_empty_job_batch());
        let encoded = bincode::serialize(&msg).unwrap();
        let decoded: ServerMessage = bincode::deserialize(&encoded).unwrap();
        assert!(decoded.is_empty_job_batch());
    }

    #[test]
    fn non_empty_job_batch_is_not_flagged_empty() {
        let msg = ServerMessage::JobBatch {
            batch_id: 7,
            targets: AnyTargets::new(vec!["host".to_string()], vec![22], vec![]),
        };
        assert!(!msg.is_empty_job_batch());
    }
}
