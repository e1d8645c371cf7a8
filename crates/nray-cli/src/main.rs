//! nray CLI: run either the coordinator (`server`) or a scanner node (`node`).

mod args;
mod banner;

use anyhow::Result;
use args::{Command, NodeArgs};
use banner::Banner;
use clap::Parser;
use nray_core::config::NodeTlsConfig;
use nray_core::{ScannerConfig, ServerConfig};
use nray_node::scanner::ScanController;
use nray_node::NodeContext;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let args = args::Args::parse();
    init_logging(args.verbose);

    let role = match &args.command {
        Command::Server { .. } => "coordinator",
        Command::Node(_) => "node",
    };
    Banner::new(env!("CARGO_PKG_VERSION")).print(role);

    if let Err(e) = run(args.command).await {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Server { config } => run_server(config).await,
        Command::Node(node_args) => run_node(node_args).await,
    }
}

async fn run_server(config_path: std::path::PathBuf) -> Result<()> {
    let config = ServerConfig::load_from_file(&config_path)?;
    nray_server::run(config).await?;
    Ok(())
}

async fn run_node(node_args: NodeArgs) -> Result<()> {
    let machine_id = nray_node::machine_id::derive();
    let preferred_name = node_args
        .node_name
        .unwrap_or_else(|| format!("node-{machine_id}"));

    let default_config = ScannerConfig::default();
    nray_node::resource_limits::ensure_capacity_for(default_config.worker_pool_size);
    let controller = Arc::new(ScanController::new(default_config));
    let ctx = Arc::new(NodeContext::new(
        machine_id,
        preferred_name,
        node_args.preferred_pool,
        controller,
    ));

    let tls_config = node_args.use_tls.then(|| NodeTlsConfig {
        ca_path: node_args.tls_ca.map(path_to_string),
        client_cert_path: node_args.tls_client_cert.map(path_to_string),
        client_key_path: node_args.tls_client_key.map(path_to_string),
        insecure_skip_verify: node_args.tls_insecure,
        server_san_override: node_args.tls_server_name,
    });

    nray_node::run(ctx, &node_args.server, tls_config.as_ref()).await?;
    Ok(())
}

fn path_to_string(path: std::path::PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .compact()
        .init();
}
