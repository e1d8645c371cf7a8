//! Top-level server run loop: binds listeners, spins up per-pool
//! background tasks, accepts connections, and drives the
//! terminal-detection / graceful-drain logic described in §4.F.

use crate::dispatch;
use crate::pool::Pool;
use crate::sinks::{EventFilter, EventSink, FileSink, IndexerSink, TerminalSink};
use crate::state::ServerContext;
use nray_core::{Error, NodeMessage, Result, ServerConfig};
use nray_proto::{Connection, DEFAULT_DEADLINE};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Build the configured sinks from `EventsConfig`. Order matches the
/// config's declaration order (terminal, then file, then indexer) —
/// events fan out to each in that order per server-receive order.
fn build_sinks(config: &ServerConfig) -> Result<Vec<Box<dyn EventSink>>> {
    let mut sinks: Vec<Box<dyn EventSink>> = Vec::new();
    let events = &config.events;

    if let Some(terminal) = &events.terminal {
        sinks.push(Box::new(TerminalSink::new(
            EventFilter::new(terminal.filter.clone()),
            1000,
        )));
    }
    if let Some(file) = &events.file {
        sinks.push(Box::new(FileSink::open(
            PathBuf::from(&file.path),
            Duration::from_secs(file.fsync_interval_secs),
            EventFilter::new(file.filter.clone()),
            10_000,
        )?));
    }
    if let Some(indexer) = &events.indexer {
        sinks.push(Box::new(IndexerSink::new(
            indexer.endpoint.clone(),
            Duration::from_secs(indexer.flush_interval_secs),
            EventFilter::new(indexer.filter.clone()),
            10_000,
        )));
    }
    Ok(sinks)
}

/// Build one pool per `PoolConfig`, wiring its target-generation
/// backends through the multiplexer and batcher into the channel the
/// pool's job generator drains.
fn build_pools(config: &ServerConfig, cancel: CancellationToken) -> Result<Vec<Arc<Pool>>> {
    let mut pools = Vec::with_capacity(config.pools.len());
    for (index, pool_config) in config.pools.iter().enumerate() {
        let rx = nray_targetgen::spawn_pipeline(&pool_config.targetgenerator, cancel.clone())?;
        pools.push(Arc::new(Pool::new(index, rx)));
    }
    Ok(pools)
}

/// Spawn the per-pool job generator and expiry-sweeper background
/// tasks described in §4.E.
fn spawn_pool_tasks(ctx: Arc<ServerContext>) {
    for (index, pool) in ctx.pools.iter().enumerate() {
        let pool = pool.clone();
        let min_waiting = ctx.config.pools[index].min_waiting_jobs;
        tokio::spawn(async move { pool.run_job_generator(min_waiting).await });

        let pool = ctx.pools[index].clone();
        let interval = Duration::from_secs(ctx.config.pools[index].expiry_check_interval_secs);
        let expiry = chrono::Duration::seconds(ctx.config.pools[index].expiry_time_secs as i64);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let evicted = pool.expire_stale_nodes(expiry);
                if !evicted.is_empty() {
                    warn!(pool = pool.index, ids = ?evicted, "expired stale nodes");
                }
            }
        });
    }
}

/// The terminal-detection loop (§4.F): after every message, and on a
/// timer while idle, check whether every pool is terminal and empty.
/// A terminal pool gets `StopAllNodes`; once the whole server is
/// drained, sinks are closed and the loop (and caller) returns.
async fn terminal_detection_loop(ctx: Arc<ServerContext>) {
    loop {
        for pool in &ctx.pools {
            if pool.is_terminal() {
                pool.stop_all_nodes();
            }
        }
        if ctx.is_fully_drained() {
            info!("all pools terminal and drained, shutting down");
            ctx.close_sinks().await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn handle_connection(ctx: Arc<ServerContext>, mut conn: Connection) {
    loop {
        let msg: Option<NodeMessage> = match conn.recv(DEFAULT_DEADLINE).await {
            Ok(msg) => msg,
            Err(Error::Timeout) => continue,
            Err(e) => {
                warn!(error = %e, "connection recv failed, closing");
                return;
            }
        };
        let Some(msg) = msg else {
            return;
        };
        let reply = dispatch::handle(&ctx, msg).await;
        if let Err(e) = conn.send(&reply, DEFAULT_DEADLINE).await {
            warn!(error = %e, "connection send failed, closing");
            return;
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    ctx: Arc<ServerContext>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => {
                let Ok((stream, peer)) = accepted else { continue };
                let ctx = ctx.clone();
                match &acceptor {
                    Some(acceptor) => {
                        let acceptor = acceptor.clone();
                        tokio::spawn(async move {
                            match acceptor.accept(stream).await {
                                Ok(tls_stream) => {
                                    handle_connection(ctx, Connection::server_tls(tls_stream)).await
                                }
                                Err(e) => error!(peer = %peer, error = %e, "TLS handshake failed"),
                            }
                        });
                    }
                    None => {
                        tokio::spawn(handle_connection(ctx, Connection::plain(stream)));
                    }
                }
            }
        }
    }
}

/// Start the coordinator: bind every configured endpoint, spin up
/// pools and sinks, and run until every pool is drained or SIGINT
/// forces a shutdown.
pub async fn run(config: ServerConfig) -> Result<()> {
    config.validate()?;
    let cancel = CancellationToken::new();

    let pools = build_pools(&config, cancel.clone())?;
    let sinks = build_sinks(&config)?;
    let acceptor = match &config.tls {
        Some(tls) => {
            let rustls_config = nray_proto::tls::load_server_config(
                std::path::Path::new(&tls.cert_path),
                std::path::Path::new(&tls.key_path),
                tls.client_ca_path.as_deref().map(std::path::Path::new),
                tls.require_client_cert,
            )?;
            Some(TlsAcceptor::from(Arc::new(rustls_config)))
        }
        None => None,
    };

    let ctx = ServerContext::new(config.clone(), pools, sinks);
    spawn_pool_tasks(ctx.clone());

    let sigint_drain = CancellationToken::new();
    crate::signal::install(sigint_drain.clone());

    let mut listeners = Vec::new();
    for endpoint in &config.listen.endpoints {
        let listener = TcpListener::bind(endpoint)
            .await
            .map_err(|e| Error::Config(format!("failed to bind {endpoint}: {e}")))?;
        info!(endpoint = %endpoint, "listening");
        listeners.push(listener);
    }

    let accept_cancel = cancel.clone();
    for listener in listeners {
        tokio::spawn(accept_loop(
            listener,
            acceptor.clone(),
            ctx.clone(),
            accept_cancel.clone(),
        ));
    }

    tokio::select! {
        _ = terminal_detection_loop(ctx.clone()) => {}
        _ = sigint_drain.cancelled() => {
            info!("draining: signalling all nodes to stop");
            for pool in &ctx.pools {
                pool.stop_all_nodes();
            }
            while !ctx.pools.iter().all(|p| p.node_count() == 0) {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            ctx.close_sinks().await;
        }
    }
    cancel.cancel();
    Ok(())
}
