//! Shared batching algorithm (§4.C): group hosts, chunk ports, pair
//! chunks into `AnyTargets` batches.

use crate::backend::HostEntry;
use nray_core::AnyTargets;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct BatchParams {
    pub max_hosts_per_batch: usize,
    pub max_tcp_ports_per_batch: usize,
    pub max_udp_ports_per_batch: usize,
}

fn chunk(mut ports: Vec<u16>, size: usize) -> Vec<Vec<u16>> {
    if size == 0 || ports.is_empty() {
        return Vec::new();
    }
    let mut rng = rand::thread_rng();
    ports.shuffle(&mut rng);
    ports.chunks(size).map(|c| c.to_vec()).collect()
}

/// Drain `hosts_rx` in blocks of `max_hosts_per_batch`, and for each
/// block emit one `AnyTargets` per (tcp-chunk, udp-chunk) pairing onto
/// `out`. Stops when `hosts_rx` closes or `out`'s receiver is dropped.
pub async fn run(
    mut hosts_rx: mpsc::Receiver<HostEntry>,
    tcp_ports: Vec<u16>,
    udp_ports: Vec<u16>,
    params: BatchParams,
    out: mpsc::Sender<AnyTargets>,
) {
    loop {
        let mut hosts = Vec::with_capacity(params.max_hosts_per_batch);
        while hosts.len() < params.max_hosts_per_batch {
            match hosts_rx.recv().await {
                Some(HostEntry::Host(h)) => hosts.push(h),
                None => break,
            }
        }
        if hosts.is_empty() {
            debug!("host source drained, batcher stopping");
            return;
        }

        let tcp_chunks = chunk(tcp_ports.clone(), params.max_tcp_ports_per_batch);
        let udp_chunks = chunk(udp_ports.clone(), params.max_udp_ports_per_batch);
        let pairs = tcp_chunks.len().max(udp_chunks.len()).max(1);

        for i in 0..pairs {
            let tcp = tcp_chunks.get(i).cloned().unwrap_or_default();
            let udp = udp_chunks.get(i).cloned().unwrap_or_default();
            if tcp.is_empty() && udp.is_empty() {
                continue;
            }
            let batch = AnyTargets::new(hosts.clone(), tcp, udp);
            if out.send(batch).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounds_batch_cardinality_by_configured_maxima() {
        let (hosts_tx, hosts_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for i in 0..5 {
                hosts_tx
                    .send(HostEntry::Host(format!("10.0.0.{i}")))
                    .await
                    .unwrap();
            }
        });

        let params = BatchParams {
            max_hosts_per_batch: 3,
            max_tcp_ports_per_batch: 2,
            max_udp_ports_per_batch: 10,
        };
        tokio::spawn(run(hosts_rx, vec![1, 2, 3, 4, 5], vec![53], params, out_tx));

        let mut seen = 0;
        while let Some(batch) = out_rx.recv().await {
            assert!(batch.hosts.len() <= 3);
            assert!(batch.tcp_ports.len() <= 2);
            assert!(batch.udp_ports.len() <= 10);
            seen += 1;
        }
        assert!(seen > 0);
    }

    #[tokio::test]
    async fn empty_host_source_emits_nothing() {
        let (hosts_tx, hosts_rx) = mpsc::channel::<HostEntry>(1);
        drop(hosts_tx);
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let params = BatchParams {
            max_hosts_per_batch: 10,
            max_tcp_ports_per_batch: 10,
            max_udp_ports_per_batch: 10,
        };
        run(hosts_rx, vec![80], vec![], params, out_tx).await;
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn both_port_lists_empty_emits_nothing() {
        let (hosts_tx, hosts_rx) = mpsc::channel(4);
        tokio::spawn(async move {
            hosts_tx
                .send(HostEntry::Host("10.0.0.1".to_string()))
                .await
                .unwrap();
        });
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let params = BatchParams {
            max_hosts_per_batch: 10,
            max_tcp_ports_per_batch: 10,
            max_udp_ports_per_batch: 10,
        };
        run(hosts_rx, vec![], vec![], params, out_tx).await;
        assert!(out_rx.recv().await.is_none());
    }
}
