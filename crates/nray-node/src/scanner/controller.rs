//! Scan controller (§4.H): a bounded worker pool that drains a per-batch
//! scan queue, translates raw port-scan results into events, and fans
//! `Open` results out to any subscribed protocol probes as a second
//! wave of work within the same batch.

use super::subscription::{subscription_key, ProtocolProbe, SubscriptionRegistry};
use crate::probes::{tcp, udp};
use crate::rate_limiter::RateLimiter;
use nray_core::{AnyTargets, Event, EventData, PortScanResult, ScanType, ScannerConfig};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Consecutive zero-in-flight samples required before a batch is
/// considered settled (§4.H).
const SETTLE_SAMPLES: u32 = 5;
const SETTLE_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
/// Sleep applied both for an empty `JobBatch` and for the pause flag.
const RETRY_DELAY: Duration = Duration::from_secs(2);

enum ScanJob {
    Tcp(String, u16),
    Udp(String, u16),
    Protocol(String, u16, ProtocolProbe),
}

/// Owns the worker pool, the subscription registry, and the pause
/// flag. One instance lives for the node's whole lifetime; each batch
/// gets a fresh set of channels.
pub struct ScanController {
    config: RwLock<ScannerConfig>,
    subscriptions: RwLock<SubscriptionRegistry>,
    paused: Arc<AtomicBool>,
}

impl ScanController {
    pub fn new(config: ScannerConfig) -> Self {
        Self {
            config: RwLock::new(config),
            subscriptions: RwLock::new(SubscriptionRegistry::new()),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Applied when the server hands down a new `ScannerConfig` on
    /// registration or re-registration.
    pub fn reconfigure(&self, config: ScannerConfig) {
        *self.config.write() = config;
    }

    pub fn subscribe(&self, proto: &str, port: u16, probe: ProtocolProbe) {
        self.subscriptions
            .write()
            .subscribe(subscription_key(proto, port), probe);
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Blocks until the pause flag clears, per the "do not drain the
    /// queue" pause semantics of the batch loop.
    pub async fn wait_while_paused(&self) {
        while self.is_paused() {
            sleep(RETRY_DELAY).await;
        }
    }

    /// Run one batch to completion: populate the scan queue, wait for
    /// quiescence, and return the accumulated events for `WorkDone`.
    pub async fn run_batch(&self, targets: AnyTargets) -> Vec<Event> {
        let config = self.config.read().clone();
        let rate_limiter = RateLimiter::new(config.rate_limit.0);
        let worker_pool_size = config.worker_pool_size.max(1);
        let udp_overrides = config.decoded_udp_overrides();

        let (scan_tx, scan_rx) = mpsc::channel::<ScanJob>(worker_pool_size * 4 + 16);
        let scan_rx = Arc::new(tokio::sync::Mutex::new(scan_rx));
        let (port_result_tx, port_result_rx) = mpsc::channel::<PortScanResult>(1024);
        let (event_tx, event_rx) = mpsc::channel::<Event>(1024);
        let in_flight = Arc::new(AtomicI64::new(0));
        let results = Arc::new(Mutex::new(Vec::new()));

        let translator_handle = tokio::spawn(translate(
            port_result_rx,
            event_tx.clone(),
            scan_tx.clone(),
            in_flight.clone(),
            self.subscriptions.read().clone(),
        ));
        let drainer_handle = tokio::spawn(drain(event_rx, results.clone()));

        let mut worker_handles = Vec::with_capacity(worker_pool_size);
        for _ in 0..worker_pool_size {
            worker_handles.push(tokio::spawn(worker_loop(
                scan_rx.clone(),
                port_result_tx.clone(),
                event_tx.clone(),
                rate_limiter.clone(),
                in_flight.clone(),
                config.tcp_timeout_ms,
                config.udp_timeout_ms,
                config.fast_udp,
                udp_overrides.clone(),
            )));
        }
        // Drop the controller's own clones so the channels close once
        // the spawned tasks drop theirs.
        drop(event_tx);
        drop(port_result_tx);

        for host in &targets.hosts {
            for &port in &targets.tcp_ports {
                in_flight.fetch_add(1, Ordering::SeqCst);
                if scan_tx.send(ScanJob::Tcp(host.clone(), port)).await.is_err() {
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            }
            for &port in &targets.udp_ports {
                in_flight.fetch_add(1, Ordering::SeqCst);
                if scan_tx.send(ScanJob::Udp(host.clone(), port)).await.is_err() {
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }

        wait_for_settle(&in_flight).await;

        drop(scan_tx);
        for handle in worker_handles {
            let _ = handle.await;
        }
        // scan_rx's last Arc clone is dropped with the workers above;
        // the translator's port_result_tx clones were already dropped
        // by the workers themselves as they returned.
        let _ = translator_handle.await;
        let _ = drainer_handle.await;

        Arc::try_unwrap(results)
            .map(Mutex::into_inner)
            .unwrap_or_else(|arc| arc.lock().clone())
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    scan_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<ScanJob>>>,
    port_result_tx: mpsc::Sender<PortScanResult>,
    event_tx: mpsc::Sender<Event>,
    rate_limiter: RateLimiter,
    in_flight: Arc<AtomicI64>,
    tcp_timeout_ms: u64,
    udp_timeout_ms: u64,
    fast_udp: bool,
    udp_overrides: HashMap<u16, Vec<u8>>,
) {
    loop {
        let job = {
            let mut rx = scan_rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else { return };

        rate_limiter.acquire().await;

        match job {
            ScanJob::Tcp(host, port) => {
                let timeout = Duration::from_millis(tcp_timeout_ms);
                match tcp::probe(&host, port, timeout).await {
                    Some(result) => {
                        let _ = port_result_tx.send(result).await;
                    }
                    None => {
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            }
            ScanJob::Udp(host, port) => {
                let timeout = Duration::from_millis(udp_timeout_ms);
                match udp::probe(&host, port, timeout, fast_udp, &udp_overrides).await {
                    Some(result) => {
                        let _ = port_result_tx.send(result).await;
                    }
                    None => {
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            }
            ScanJob::Protocol(host, port, probe) => {
                if let Some(event) = probe(host, port).await {
                    let _ = event_tx.send(event).await;
                }
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

/// Translates raw port-scan results into events and, for `Open`
/// results, fans out to any subscribed protocol probes. The original
/// job's in-flight slot is only released after its follow-ups have
/// already been counted, so the settle heuristic never observes a
/// transient zero while new work is about to land.
async fn translate(
    mut port_result_rx: mpsc::Receiver<PortScanResult>,
    event_tx: mpsc::Sender<Event>,
    scan_tx: mpsc::Sender<ScanJob>,
    in_flight: Arc<AtomicI64>,
    subscriptions: SubscriptionRegistry,
) {
    while let Some(result) = port_result_rx.recv().await {
        let proto = match result.scan_type {
            ScanType::TcpConnect => "tcp",
            ScanType::Udp => "udp",
        };
        let key = subscription_key(proto, result.port);
        let open = result.open;
        let host = result.target.clone();
        let port = result.port;

        let event = Event::new("", "", EventData::PortScanResult(result));
        let _ = event_tx.send(event).await;

        if open {
            for probe in subscriptions.lookup(&key) {
                in_flight.fetch_add(1, Ordering::SeqCst);
                if scan_tx
                    .send(ScanJob::Protocol(host.clone(), port, probe))
                    .await
                    .is_err()
                {
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
        in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn drain(mut event_rx: mpsc::Receiver<Event>, results: Arc<Mutex<Vec<Event>>>) {
    while let Some(event) = event_rx.recv().await {
        results.lock().push(event);
    }
}

async fn wait_for_settle(in_flight: &AtomicI64) {
    let mut consecutive = 0;
    loop {
        sleep(SETTLE_SAMPLE_INTERVAL).await;
        if in_flight.load(Ordering::SeqCst) <= 0 {
            consecutive += 1;
            if consecutive >= SETTLE_SAMPLES {
                return;
            }
        } else {
            consecutive = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nray_core::RateLimit;
    use tokio::net::TcpListener;

    fn test_config() -> ScannerConfig {
        ScannerConfig {
            worker_pool_size: 8,
            rate_limit: RateLimit(None),
            tcp_timeout_ms: 200,
            udp_timeout_ms: 100,
            fast_udp: true,
        }
    }

    #[tokio::test]
    async fn batch_with_no_hosts_settles_immediately() {
        let controller = Arc::new(ScanController::new(test_config()));
        let events = controller.run_batch(AnyTargets::default()).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn batch_scans_every_open_tcp_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    return;
                }
            }
        });

        let controller = Arc::new(ScanController::new(test_config()));
        let targets = AnyTargets::new(vec!["127.0.0.1".to_string()], vec![port], vec![]);
        let events = controller.run_batch(targets).await;

        assert_eq!(events.len(), 1);
        match &events[0].data {
            EventData::PortScanResult(r) => {
                assert!(r.open);
                assert_eq!(r.port, port);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn open_port_triggers_subscribed_protocol_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    return;
                }
            }
        });

        let controller = Arc::new(ScanController::new(test_config()));
        let probe: ProtocolProbe = Arc::new(|host, port| {
            Box::pin(async move {
                Some(Event::new(
                    "",
                    "",
                    EventData::ProtocolScanResult(nray_core::ProtocolScanResult {
                        target: host,
                        port,
                        protocol: "test".to_string(),
                        data: serde_json::Value::Null,
                    }),
                ))
            })
        });
        controller.subscribe("tcp", port, probe);

        let targets = AnyTargets::new(vec!["127.0.0.1".to_string()], vec![port], vec![]);
        let events = controller.run_batch(targets).await;

        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .any(|e| matches!(&e.data, EventData::ProtocolScanResult(r) if r.protocol == "test")));
    }

    #[tokio::test]
    async fn wait_while_paused_returns_once_unpaused() {
        let controller = Arc::new(ScanController::new(test_config()));
        controller.set_paused(true);
        let flag = controller.clone();
        let handle = tokio::spawn(async move { flag.wait_while_paused().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        controller.set_paused(false);
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("wait_while_paused did not return after unpausing")
            .unwrap();
    }
}
