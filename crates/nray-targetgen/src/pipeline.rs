//! Wires a pool's `TargetGeneratorConfig` into a running pipeline:
//! backends -> multiplexer -> batcher, yielding the channel a pool's
//! job generator drains.

use crate::backend::TargetBackend;
use crate::batcher::{self, BatchParams};
use crate::multiplexer;
use crate::static_backend::StaticBackend;
use nray_core::{AnyTargets, Blacklist, PortProtocol, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Build the configured backends, merge them through the multiplexer,
/// and batch their hosts against the configured TCP/UDP port lists.
/// Returns the channel the pool's job generator reads `AnyTargets`
/// batches from; it closes once every backend is exhausted.
pub fn spawn_pipeline(
    config: &nray_core::TargetGeneratorConfig,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<AnyTargets>> {
    let mut blacklist = Blacklist::new();
    for entry in &config.blacklist {
        blacklist.add(entry);
    }

    let mut backends: Vec<Arc<dyn TargetBackend>> = Vec::new();
    if !config.targets.is_empty() || config.targets_file.is_some() {
        backends.push(Arc::new(StaticBackend::new(
            config.targets.clone(),
            config.targets_file.as_ref().map(PathBuf::from),
            blacklist.clone(),
        )));
    }

    // Certificate-transparency and directory backends need a concrete
    // stream/search implementation the server's config alone can't
    // supply (an external CT firehose, a live LDAP connection); those
    // are wired up by whatever embeds this pipeline with a real
    // implementation of `CertificateStream`/`DirectorySearch` and
    // passed in via `spawn_pipeline_with_backends` below. A
    // configuration that names either without the corresponding
    // constructor simply can't produce hosts from it.

    let hosts_rx = multiplexer::spawn(backends, config.multiplexer_buffer_size, cancel);

    let tcp_ports = nray_core::parse_ports(&config.tcp_ports, PortProtocol::Tcp);
    let udp_ports = nray_core::parse_ports(&config.udp_ports, PortProtocol::Udp);
    let params = BatchParams {
        max_hosts_per_batch: config.max_hosts_per_batch,
        max_tcp_ports_per_batch: config.max_tcp_ports_per_batch,
        max_udp_ports_per_batch: config.max_udp_ports_per_batch,
    };

    let (out_tx, out_rx) = mpsc::channel(config.multiplexer_buffer_size);
    tokio::spawn(batcher::run(hosts_rx, tcp_ports, udp_ports, params, out_tx));
    Ok(out_rx)
}

/// Same as `spawn_pipeline`, but with additional pre-built backends
/// (e.g. a live CT subscription or directory search) appended to the
/// static backend before the multiplexer fans them in.
pub fn spawn_pipeline_with_backends(
    config: &nray_core::TargetGeneratorConfig,
    mut extra_backends: Vec<Arc<dyn TargetBackend>>,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<AnyTargets>> {
    let mut blacklist = Blacklist::new();
    for entry in &config.blacklist {
        blacklist.add(entry);
    }

    let mut backends: Vec<Arc<dyn TargetBackend>> = Vec::new();
    if !config.targets.is_empty() || config.targets_file.is_some() {
        backends.push(Arc::new(StaticBackend::new(
            config.targets.clone(),
            config.targets_file.as_ref().map(PathBuf::from),
            blacklist,
        )));
    }
    backends.append(&mut extra_backends);

    let hosts_rx = multiplexer::spawn(backends, config.multiplexer_buffer_size, cancel);
    let tcp_ports = nray_core::parse_ports(&config.tcp_ports, PortProtocol::Tcp);
    let udp_ports = nray_core::parse_ports(&config.udp_ports, PortProtocol::Udp);
    let params = BatchParams {
        max_hosts_per_batch: config.max_hosts_per_batch,
        max_tcp_ports_per_batch: config.max_tcp_ports_per_batch,
        max_udp_ports_per_batch: config.max_udp_ports_per_batch,
    };

    let (out_tx, out_rx) = mpsc::channel(config.multiplexer_buffer_size);
    tokio::spawn(batcher::run(hosts_rx, tcp_ports, udp_ports, params, out_tx));
    Ok(out_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nray_core::TargetGeneratorConfig;

    #[tokio::test]
    async fn pipeline_emits_batches_bounded_by_configured_maxima() {
        let config = TargetGeneratorConfig {
            targets: vec!["127.0.0.1".to_string(), "127.0.0.2".to_string()],
            tcp_ports: vec!["22".to_string(), "80".to_string()],
            max_hosts_per_batch: 1,
            ..Default::default()
        };
        let mut rx = spawn_pipeline(&config, CancellationToken::new()).unwrap();
        let mut total_hosts = 0;
        while let Some(batch) = rx.recv().await {
            assert!(batch.hosts.len() <= 1);
            total_hosts += batch.hosts.len();
        }
        assert_eq!(total_hosts, 2);
    }
}
