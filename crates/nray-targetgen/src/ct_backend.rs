//! Certificate-transparency backend: subscribes to an external stream
//! of issued-certificate events and forwards domains matching a
//! configured pattern.
//!
//! The original never closed its host channel when the upstream
//! stream ended, leaving the produce task spinning forever; this
//! version selects over the upstream and a cancellation token and
//! closes (returns) on either, which is what lets the multiplexer
//! notice this backend finished.

use crate::backend::{HostEntry, TargetBackend};
use async_trait::async_trait;
use nray_core::Result;
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// An upstream source of freshly issued certificate domain names.
/// `None` signals the stream ended.
#[async_trait]
pub trait CertificateStream: Send + Sync {
    async fn next_domain(&mut self) -> Option<String>;
}

pub struct CertificateTransparencyBackend<S> {
    stream: tokio::sync::Mutex<S>,
    domain_pattern: Regex,
}

impl<S: CertificateStream> CertificateTransparencyBackend<S> {
    pub fn new(stream: S, domain_pattern: Regex) -> Self {
        Self {
            stream: tokio::sync::Mutex::new(stream),
            domain_pattern,
        }
    }
}

#[async_trait]
impl<S: CertificateStream + Send> TargetBackend for CertificateTransparencyBackend<S> {
    fn name(&self) -> &str {
        "certificate_transparency"
    }

    fn total_count(&self) -> Option<u64> {
        None
    }

    async fn produce(&self, tx: mpsc::Sender<HostEntry>, cancel: CancellationToken) -> Result<()> {
        let mut stream = self.stream.lock().await;
        loop {
            let domain = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("certificate-transparency backend cancelled");
                    return Ok(());
                }
                domain = stream.next_domain() => domain,
            };
            let Some(domain) = domain else {
                debug!("certificate-transparency stream ended upstream");
                return Ok(());
            };
            if !self.domain_pattern.is_match(&domain) {
                continue;
            }
            if tx.send(HostEntry::Host(domain)).await.is_err() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FakeStream(VecDeque<String>);

    #[async_trait]
    impl CertificateStream for FakeStream {
        async fn next_domain(&mut self) -> Option<String> {
            self.0.pop_front()
        }
    }

    #[tokio::test]
    async fn closes_output_when_upstream_ends() {
        let stream = FakeStream(VecDeque::from(vec![
            "foo.example.com".to_string(),
            "bar.other.com".to_string(),
        ]));
        let backend = CertificateTransparencyBackend::new(stream, Regex::new(r"\.example\.com$").unwrap());
        let (tx, mut rx) = mpsc::channel(8);
        backend.produce(tx, CancellationToken::new()).await.unwrap();

        let mut hosts = Vec::new();
        while let Some(HostEntry::Host(h)) = rx.recv().await {
            hosts.push(h);
        }
        assert_eq!(hosts, vec!["foo.example.com".to_string()]);
    }

    #[tokio::test]
    async fn cancellation_stops_the_produce_task() {
        let stream = FakeStream(VecDeque::new());
        let backend = CertificateTransparencyBackend::new(stream, Regex::new(".*").unwrap());
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(backend.produce(tx, cancel).await.is_ok());
    }
}
