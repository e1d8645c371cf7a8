//! Node message loop (§4.G): connect, register, then drive a single
//! send-then-receive round trip per outbound message. Three producers
//! feed one outbound channel — the heartbeat ticker, the scan
//! controller's per-batch `MoreWorkRequest`/`WorkDone`, and
//! re-registration — and the loop itself is the sole consumer, so
//! replies are dispatched against exactly the request that produced
//! them without needing a correlation id.

use crate::context::NodeContext;
use chrono::{DateTime, Utc};
use nray_core::config::NodeTlsConfig;
use nray_core::{Error, Event, EventData, NodeMessage, Result, ScannerConfig, ServerMessage};
use nray_proto::{Connection, DEFAULT_DEADLINE};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Sleep applied when a `JobBatch` comes back empty and when the scan
/// controller's pause flag is set.
const RETRY_DELAY: Duration = Duration::from_secs(2);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Connect (optionally over TLS), register, and run the message loop
/// until a clean `Goodbye` or a fatal I/O/timeout error.
pub async fn run(ctx: Arc<NodeContext>, server_addr: &str, tls: Option<&NodeTlsConfig>) -> Result<()> {
    let mut connection = connect(server_addr, tls).await?;
    register(&mut connection, &ctx).await?;
    info!(node_id = ?ctx.node_id(), "registered with server");

    let cancel = CancellationToken::new();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<NodeMessage>();
    let (batch_tx, batch_rx) = mpsc::channel::<ServerMessage>(1);

    let heartbeat_handle = tokio::spawn(heartbeat_ticker(ctx.clone(), outbound_tx.clone(), cancel.clone()));
    let scan_handle = tokio::spawn(scan_loop(ctx.clone(), outbound_tx.clone(), batch_rx, cancel.clone()));

    let result = drive(&mut connection, &ctx, &mut outbound_rx, &batch_tx, &outbound_tx).await;
    drop(outbound_tx);

    cancel.cancel();
    let _ = heartbeat_handle.await;
    let _ = scan_handle.await;

    result
}

async fn drive(
    connection: &mut Connection,
    ctx: &Arc<NodeContext>,
    outbound_rx: &mut mpsc::UnboundedReceiver<NodeMessage>,
    batch_tx: &mpsc::Sender<ServerMessage>,
    outbound_tx: &mpsc::UnboundedSender<NodeMessage>,
) -> Result<()> {
    'next_message: loop {
        let Some(outbound) = outbound_rx.recv().await else {
            return Ok(());
        };
        let is_heartbeat = matches!(outbound, NodeMessage::Heartbeat { .. });

        // Re-sent on NodeIsUnregistered (unless the pending message was
        // itself a heartbeat, which is fine to just drop).
        loop {
            connection.send(&outbound, DEFAULT_DEADLINE).await?;
            let reply: ServerMessage = connection
                .recv(DEFAULT_DEADLINE)
                .await?
                .ok_or_else(|| Error::Protocol("server closed the connection".to_string()))?;

            match reply {
                ServerMessage::HeartbeatAck { running, scanning } => {
                    ctx.controller.set_paused(!scanning || !running);
                    if !running {
                        if let Some(node_id) = ctx.node_id() {
                            // Enqueue onto the normal outbound channel so
                            // Goodbye gets its own send/recv round trip
                            // and reply, instead of racing a reply onto
                            // the socket out of turn with the request
                            // that's about to be sent next.
                            let _ = outbound_tx.send(NodeMessage::Goodbye { node_id });
                        }
                    }
                    continue 'next_message;
                }
                ServerMessage::JobBatch { .. } => {
                    let _ = batch_tx.send(reply).await;
                    continue 'next_message;
                }
                ServerMessage::WorkDoneAck => continue 'next_message,
                ServerMessage::GoodbyeAck { ok: true } => return Ok(()),
                ServerMessage::GoodbyeAck { ok: false } => {
                    warn!("server rejected Goodbye; exiting anyway");
                    return Ok(());
                }
                ServerMessage::NodeIsUnregistered { .. } => {
                    warn!("server forgot this node, re-registering");
                    register(connection, ctx).await?;
                    if is_heartbeat {
                        continue 'next_message;
                    }
                    // Loop again and re-send the same outbound message.
                }
                ServerMessage::RegisteredNode {
                    node_id,
                    server_clock,
                    scanner_config,
                } => {
                    apply_registration(ctx, node_id, server_clock, scanner_config)?;
                    continue 'next_message;
                }
            }
        }
    }
}

async fn heartbeat_ticker(ctx: Arc<NodeContext>, outbound_tx: mpsc::UnboundedSender<NodeMessage>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        let Some(node_id) = ctx.node_id() else { continue };
        let beat_time = ctx.now();
        if outbound_tx.send(NodeMessage::Heartbeat { node_id, beat_time }).is_err() {
            return;
        }
    }
}

async fn scan_loop(
    ctx: Arc<NodeContext>,
    outbound_tx: mpsc::UnboundedSender<NodeMessage>,
    mut batch_rx: mpsc::Receiver<ServerMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ctx.controller.wait_while_paused() => {}
        }

        let Some(node_id) = ctx.node_id() else {
            tokio::time::sleep(Duration::from_millis(200)).await;
            continue;
        };
        if outbound_tx.send(NodeMessage::MoreWorkRequest { node_id }).is_err() {
            return;
        }

        let reply = tokio::select! {
            _ = cancel.cancelled() => return,
            reply = batch_rx.recv() => reply,
        };
        let Some(ServerMessage::JobBatch { batch_id, targets }) = reply else {
            return;
        };
        if batch_id == 0 {
            tokio::time::sleep(RETRY_DELAY).await;
            continue;
        }

        let events = ctx.controller.run_batch(targets).await;
        let Some(node_id) = ctx.node_id() else { return };
        if outbound_tx
            .send(NodeMessage::WorkDone { node_id, batch_id, events })
            .is_err()
        {
            return;
        }
    }
}

async fn register(connection: &mut Connection, ctx: &NodeContext) -> Result<()> {
    let env_event = Event::new(
        "",
        ctx.preferred_name.clone(),
        EventData::EnvironmentInfo(ctx.env_info.clone()),
    );
    let message = NodeMessage::NodeRegister {
        machine_id: ctx.machine_id.clone(),
        preferred_name: ctx.preferred_name.clone(),
        preferred_pool: ctx.preferred_pool,
        env_info: env_event,
    };
    connection.send(&message, DEFAULT_DEADLINE).await?;
    let reply: ServerMessage = connection
        .recv(DEFAULT_DEADLINE)
        .await?
        .ok_or_else(|| Error::Protocol("connection closed during registration".to_string()))?;

    match reply {
        ServerMessage::RegisteredNode {
            node_id,
            server_clock,
            scanner_config,
        } => apply_registration(ctx, node_id, server_clock, scanner_config),
        other => Err(Error::Protocol(format!(
            "unexpected reply to NodeRegister: {other:?}"
        ))),
    }
}

fn apply_registration(
    ctx: &NodeContext,
    node_id: String,
    server_clock: DateTime<Utc>,
    scanner_config: Option<Vec<u8>>,
) -> Result<()> {
    ctx.set_node_id(node_id);
    ctx.set_time_offset_from_server_clock(server_clock);
    if let Some(bytes) = scanner_config {
        let config: ScannerConfig = bincode::deserialize(&bytes)?;
        crate::resource_limits::ensure_capacity_for(config.worker_pool_size);
        ctx.controller.reconfigure(config);
    }
    Ok(())
}

async fn connect(server_addr: &str, tls: Option<&NodeTlsConfig>) -> Result<Connection> {
    let tcp = TcpStream::connect(server_addr).await.map_err(Error::Io)?;
    let Some(tls_config) = tls else {
        return Ok(Connection::plain(tcp));
    };

    let client_config = nray_proto::tls::load_client_config(
        tls_config.ca_path.as_deref().map(Path::new),
        tls_config.client_cert_path.as_deref().map(Path::new),
        tls_config.client_key_path.as_deref().map(Path::new),
        tls_config.insecure_skip_verify,
    )?;
    let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));
    let server_name_str = tls_config
        .server_san_override
        .clone()
        .unwrap_or_else(|| host_only(server_addr));
    let server_name = rustls::pki_types::ServerName::try_from(server_name_str)
        .map_err(|e| Error::Config(format!("invalid TLS server name: {e}")))?;
    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(Error::Io)?;
    Ok(Connection::client_tls(stream))
}

fn host_only(addr: &str) -> String {
    addr.rsplit_once(':')
        .map(|(host, _)| host.to_string())
        .unwrap_or_else(|| addr.to_string())
}
