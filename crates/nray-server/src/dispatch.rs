//! Server message loop (§4.F): dispatches one `NodeMessage` to exactly
//! one `ServerMessage` reply, enforcing registration and implementing
//! the six dispatch rules. No exception escapes this boundary (§7):
//! every branch returns a reply, never a transport error.

use crate::pool::{self, Pool};
use crate::state::ServerContext;
use chrono::Utc;
use nray_core::{EventData, NodeMessage, Node, ServerMessage};
use std::sync::Arc;
use tracing::{info, warn};

/// How stale a heartbeat timestamp has to be, relative to server wall
/// clock, before the node gets told to pause (§4.F rule 3).
const HEARTBEAT_STALENESS_LIMIT: chrono::Duration = chrono::Duration::seconds(10);

pub async fn handle(ctx: &ServerContext, msg: NodeMessage) -> ServerMessage {
    if !msg.is_register() {
        let node_id = msg.node_id().unwrap_or_default().to_string();
        if pool::find_pool_with_node(&ctx.pools, &node_id).is_none() {
            return ServerMessage::NodeIsUnregistered { node_id };
        }
    }

    match msg {
        NodeMessage::NodeRegister {
            machine_id,
            preferred_name,
            preferred_pool,
            env_info,
        } => handle_register(ctx, machine_id, preferred_name, preferred_pool, env_info),
        NodeMessage::Heartbeat { node_id, beat_time } => handle_heartbeat(ctx, node_id, beat_time),
        NodeMessage::MoreWorkRequest { node_id } => handle_more_work(ctx, node_id),
        NodeMessage::WorkDone {
            node_id,
            batch_id,
            events,
        } => handle_work_done(ctx, node_id, batch_id, events),
        NodeMessage::Goodbye { node_id } => handle_goodbye(ctx, node_id),
    }
}

fn handle_register(
    ctx: &ServerContext,
    machine_id: String,
    preferred_name: String,
    preferred_pool: i32,
    env_info: nray_core::Event,
) -> ServerMessage {
    let allow_multiple = ctx
        .config
        .pools
        .first()
        .map(|p| p.allow_multiple_per_host)
        .unwrap_or(true);

    if !allow_multiple && pool::machine_id_registered(&ctx.pools, &machine_id) {
        warn!(machine_id = %machine_id, "rejecting duplicate machine id registration");
        return ServerMessage::RegisteredNode {
            node_id: String::new(),
            server_clock: Utc::now(),
            scanner_config: None,
        };
    }

    let node_id = if allow_multiple {
        pool::fresh_random_node_id(&ctx.pools)
    } else {
        machine_id
    };

    let consider_preference = ctx
        .config
        .pools
        .first()
        .map(|p| p.consider_client_pool_preference)
        .unwrap_or(true);
    let preferred_index = usize::try_from(preferred_pool).ok();
    let preferred = preferred_index
        .filter(|&i| consider_preference && i < ctx.pools.len())
        .map(|i| ctx.pools[i].clone());
    let pool: Arc<Pool> = match preferred {
        Some(pool) => pool,
        None => pool::smallest_pool(&ctx.pools).expect("at least one pool is always configured"),
    };

    let env_info_data = match &env_info.data {
        EventData::EnvironmentInfo(info) => info.clone(),
        _ => nray_core::EnvironmentInfo::default(),
    };
    let node = Node::new(node_id.clone(), preferred_name, env_info_data, Utc::now());
    pool.insert_node(node);
    info!(node_id = %node_id, pool = pool.index, "node registered");

    ctx.fan_out(nray_core::Event {
        node_id: node_id.clone(),
        ..env_info
    });

    let scanner_config = ctx
        .config
        .pools
        .get(pool.index)
        .and_then(|p| serde_json::to_vec(&p.scannerconfig).ok());

    ServerMessage::RegisteredNode {
        node_id,
        server_clock: Utc::now(),
        scanner_config,
    }
}

fn handle_heartbeat(ctx: &ServerContext, node_id: String, beat_time: chrono::DateTime<Utc>) -> ServerMessage {
    let pool = pool::find_pool_with_node(&ctx.pools, &node_id)
        .expect("checked registered above")
        .clone();

    if Utc::now() - beat_time > HEARTBEAT_STALENESS_LIMIT {
        return ServerMessage::HeartbeatAck {
            running: true,
            scanning: false,
        };
    }
    pool.touch_heartbeat(&node_id, beat_time);

    if pool.no_more_work_to_assign() {
        pool.set_should_stop(&node_id, true);
    }
    let node = pool.get_node(&node_id).expect("just touched");
    ServerMessage::HeartbeatAck {
        running: !node.should_stop,
        scanning: !node.scan_paused,
    }
}

fn handle_more_work(ctx: &ServerContext, node_id: String) -> ServerMessage {
    let pool = pool::find_pool_with_node(&ctx.pools, &node_id)
        .expect("checked registered above")
        .clone();
    match pool.get_job_for_node(&node_id) {
        Some(job) => ServerMessage::JobBatch {
            batch_id: job.id,
            targets: job.targets,
        },
        None => ServerMessage::empty_job_batch(),
    }
}

fn handle_work_done(
    ctx: &ServerContext,
    node_id: String,
    batch_id: u64,
    events: Vec<nray_core::Event>,
) -> ServerMessage {
    let pool = pool::find_pool_with_node(&ctx.pools, &node_id)
        .expect("checked registered above")
        .clone();

    for event in events {
        ctx.fan_out(event);
    }
    if let Err(e) = pool.complete_job(&node_id, batch_id) {
        warn!(node_id = %node_id, batch_id, error = %e, "work-done for unknown/duplicate job");
    }
    ServerMessage::WorkDoneAck
}

fn handle_goodbye(ctx: &ServerContext, node_id: String) -> ServerMessage {
    let pool = pool::find_pool_with_node(&ctx.pools, &node_id)
        .expect("checked registered above")
        .clone();
    let ok = pool.remove_node_graceful(&node_id);
    if ok {
        info!(node_id = %node_id, "node said goodbye");
    } else {
        warn!(node_id = %node_id, "goodbye refused: node still has an in-progress job");
    }
    ServerMessage::GoodbyeAck { ok }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use nray_core::{EnvironmentInfo, EventData, PoolConfig, ServerConfig};
    use tokio::sync::mpsc;

    fn test_context(pool_count: usize) -> (Arc<ServerContext>, Vec<mpsc::Sender<nray_core::AnyTargets>>) {
        let mut pools = Vec::new();
        let mut senders = Vec::new();
        let mut config = ServerConfig::default();
        config.pools.clear();
        for i in 0..pool_count {
            let (tx, rx) = mpsc::channel(8);
            pools.push(Arc::new(Pool::new(i, rx)));
            senders.push(tx);
            config.pools.push(PoolConfig::default());
        }
        (ServerContext::new(config, pools, Vec::new()), senders)
    }

    fn register_msg(machine_id: &str) -> NodeMessage {
        NodeMessage::NodeRegister {
            machine_id: machine_id.to_string(),
            preferred_name: "node-a".to_string(),
            preferred_pool: -1,
            env_info: nray_core::Event::new(
                "",
                "node-a",
                EventData::EnvironmentInfo(EnvironmentInfo::default()),
            ),
        }
    }

    #[tokio::test]
    async fn unregistered_node_gets_told_to_reregister() {
        let (ctx, _) = test_context(1);
        let reply = handle(&ctx, NodeMessage::Heartbeat {
            node_id: "nobody".to_string(),
            beat_time: Utc::now(),
        }).await;
        assert!(matches!(reply, ServerMessage::NodeIsUnregistered { .. }));
    }

    #[tokio::test]
    async fn register_then_heartbeat_then_goodbye_round_trip() {
        let (ctx, _) = test_context(1);
        let reply = handle(&ctx, register_msg("machine-1")).await;
        let node_id = match reply {
            ServerMessage::RegisteredNode { node_id, .. } => node_id,
            _ => panic!("expected RegisteredNode"),
        };
        assert!(!node_id.is_empty());

        let hb = handle(&ctx, NodeMessage::Heartbeat {
            node_id: node_id.clone(),
            beat_time: Utc::now(),
        }).await;
        assert!(matches!(hb, ServerMessage::HeartbeatAck { running: true, scanning: true }));

        let bye = handle(&ctx, NodeMessage::Goodbye { node_id }).await;
        assert!(matches!(bye, ServerMessage::GoodbyeAck { ok: true }));
    }

    #[tokio::test]
    async fn stale_heartbeat_pauses_the_node() {
        let (ctx, _) = test_context(1);
        let reply = handle(&ctx, register_msg("machine-1")).await;
        let node_id = match reply {
            ServerMessage::RegisteredNode { node_id, .. } => node_id,
            _ => panic!("expected RegisteredNode"),
        };
        let stale = Utc::now() - chrono::Duration::seconds(30);
        let hb = handle(&ctx, NodeMessage::Heartbeat { node_id, beat_time: stale }).await;
        assert!(matches!(hb, ServerMessage::HeartbeatAck { running: true, scanning: false }));
    }

    #[tokio::test]
    async fn more_work_returns_empty_batch_when_no_jobs() {
        let (ctx, _) = test_context(1);
        let reply = handle(&ctx, register_msg("machine-1")).await;
        let node_id = match reply {
            ServerMessage::RegisteredNode { node_id, .. } => node_id,
            _ => panic!("expected RegisteredNode"),
        };
        let work = handle(&ctx, NodeMessage::MoreWorkRequest { node_id }).await;
        assert!(work.is_empty_job_batch());
    }

    #[tokio::test]
    async fn duplicate_machine_id_rejected_when_multiples_disallowed() {
        let (ctx, _) = test_context(1);
        let mut config = ctx.config.clone();
        config.pools[0].allow_multiple_per_host = false;
        let pools = ctx.pools.clone();
        let ctx2 = ServerContext::new(config, pools, Vec::new());

        let first = handle(&ctx2, register_msg("dup-machine")).await;
        assert!(matches!(first, ServerMessage::RegisteredNode { .. }));

        let second = handle(&ctx2, register_msg("dup-machine")).await;
        match second {
            ServerMessage::RegisteredNode { node_id, .. } => assert!(node_id.is_empty()),
            _ => panic!("expected RegisteredNode"),
        }
    }
}
