//! `TargetBackend` — the common contract every target source implements.

use async_trait::async_trait;
use nray_core::Result;
use tokio::sync::mpsc;

/// A host yielded by a backend's host source, already classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEntry {
    Host(String),
}

/// Produces hosts onto a bounded channel until its source is exhausted,
/// then drops the sender to signal end-of-stream.
#[async_trait]
pub trait TargetBackend: Send + Sync {
    /// Human-readable name, used in logs and subscription keys.
    fn name(&self) -> &str;

    /// Best-effort total host count, if knowable up front (e.g. a
    /// static list); `None` for open-ended sources like a CT stream.
    fn total_count(&self) -> Option<u64>;

    /// Drive hosts onto `tx` until exhausted or `cancel` fires,
    /// whichever comes first.
    async fn produce(&self, tx: mpsc::Sender<HostEntry>, cancel: tokio_util::sync::CancellationToken) -> Result<()>;
}
