//! Merges multiple backend host-streams into one bounded stream,
//! draining them round-robin and closing once every backend closes.

use crate::backend::{HostEntry, TargetBackend};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Spawn one produce task per backend, fan their output into a single
/// bounded channel of the given buffer size, and return its receiver.
/// The returned channel closes once every backend has finished.
pub fn spawn(
    backends: Vec<Arc<dyn TargetBackend>>,
    buffer_size: usize,
    cancel: CancellationToken,
) -> mpsc::Receiver<HostEntry> {
    let (tx, rx) = mpsc::channel(buffer_size);
    for backend in backends {
        let tx = tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let name = backend.name().to_string();
            if let Err(e) = backend.produce(tx, cancel).await {
                tracing::warn!(backend = %name, error = %e, "backend produce task failed");
            } else {
                info!(backend = %name, "backend exhausted");
            }
        });
    }
    // Dropping our own clone lets the channel close once every spawned
    // task has dropped its sender.
    drop(tx);
    rx
}

/// Total host count across backends that report one; `None` if any
/// backend is open-ended.
pub fn total_count(backends: &[Arc<dyn TargetBackend>]) -> Option<u64> {
    backends
        .iter()
        .try_fold(0u64, |acc, b| b.total_count().map(|c| acc + c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_backend::StaticBackend;
    use nray_core::Blacklist;

    #[tokio::test]
    async fn closes_once_all_backends_are_exhausted() {
        let a: Arc<dyn TargetBackend> = Arc::new(StaticBackend::new(
            vec!["10.0.0.1".to_string()],
            None,
            Blacklist::new(),
        ));
        let b: Arc<dyn TargetBackend> = Arc::new(StaticBackend::new(
            vec!["10.0.0.2".to_string()],
            None,
            Blacklist::new(),
        ));
        let mut rx = spawn(vec![a, b], 5, CancellationToken::new());
        let mut hosts = Vec::new();
        while let Some(HostEntry::Host(h)) = rx.recv().await {
            hosts.push(h);
        }
        hosts.sort();
        assert_eq!(hosts, vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
    }

    #[test]
    fn total_count_is_none_if_any_backend_is_open_ended() {
        let a: Arc<dyn TargetBackend> = Arc::new(StaticBackend::new(vec![], None, Blacklist::new()));
        assert_eq!(total_count(&[a]), None);
    }
}
