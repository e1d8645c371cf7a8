//! Static backend: an inline host list plus an optional line-delimited
//! file, each entry classified as CIDR, IPv4 literal, or DNS name.

use crate::backend::{HostEntry, TargetBackend};
use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use nray_core::{Blacklist, Result};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct StaticBackend {
    entries: Vec<String>,
    file: Option<PathBuf>,
    blacklist: Blacklist,
}

impl StaticBackend {
    pub fn new(entries: Vec<String>, file: Option<PathBuf>, blacklist: Blacklist) -> Self {
        Self {
            entries,
            file,
            blacklist,
        }
    }

    fn load_entries(&self) -> Result<Vec<String>> {
        let mut all = self.entries.clone();
        if let Some(path) = &self.file {
            let contents = std::fs::read_to_string(path)?;
            all.extend(
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string),
            );
        }
        Ok(all)
    }
}

fn looks_like_dns_name(entry: &str) -> bool {
    !entry.contains(':') && !entry.contains('/') && entry.parse::<Ipv4Addr>().is_err()
}

#[async_trait]
impl TargetBackend for StaticBackend {
    fn name(&self) -> &str {
        "static"
    }

    fn total_count(&self) -> Option<u64> {
        None
    }

    async fn produce(&self, tx: mpsc::Sender<HostEntry>, cancel: CancellationToken) -> Result<()> {
        let entries = self.load_entries()?;
        for entry in entries {
            if cancel.is_cancelled() {
                break;
            }
            if let Ok(net) = entry.parse::<Ipv4Network>() {
                let enumerator = nray_core::enumerate(net, self.blacklist.clone())?;
                for ip in enumerator {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if tx
                        .send(HostEntry::Host(ip.to_string()))
                        .await
                        .is_err()
                    {
                        return Ok(());
                    }
                }
            } else if let Ok(addr) = entry.parse::<Ipv4Addr>() {
                if self.blacklist.is_ip_blacklisted(&addr.into()) {
                    continue;
                }
                if tx.send(HostEntry::Host(addr.to_string())).await.is_err() {
                    return Ok(());
                }
            } else if looks_like_dns_name(&entry) {
                if self.blacklist.is_dns_name_blacklisted(&entry) {
                    continue;
                }
                if tx.send(HostEntry::Host(entry)).await.is_err() {
                    return Ok(());
                }
            } else {
                warn!("can't classify target entry '{entry}', dropping");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expands_cidr_respecting_blacklist() {
        let mut blacklist = Blacklist::new();
        blacklist.add("172.24.12.5");
        let backend = StaticBackend::new(
            vec!["172.24.12.0/28".to_string()],
            None,
            blacklist,
        );
        let (tx, mut rx) = mpsc::channel(32);
        backend.produce(tx, CancellationToken::new()).await.unwrap();

        let mut hosts = Vec::new();
        while let Some(HostEntry::Host(h)) = rx.recv().await {
            hosts.push(h);
        }
        assert_eq!(hosts.len(), 15);
        assert!(!hosts.contains(&"172.24.12.5".to_string()));
    }

    #[tokio::test]
    async fn classifies_dns_name_and_ipv4_literal() {
        let backend = StaticBackend::new(
            vec!["scanme.nmap.org".to_string(), "127.0.0.1".to_string()],
            None,
            Blacklist::new(),
        );
        let (tx, mut rx) = mpsc::channel(8);
        backend.produce(tx, CancellationToken::new()).await.unwrap();
        let mut hosts = Vec::new();
        while let Some(HostEntry::Host(h)) = rx.recv().await {
            hosts.push(h);
        }
        assert_eq!(hosts.len(), 2);
        assert!(hosts.contains(&"scanme.nmap.org".to_string()));
        assert!(hosts.contains(&"127.0.0.1".to_string()));
    }

    #[tokio::test]
    async fn drops_unclassifiable_entry() {
        let backend = StaticBackend::new(
            vec!["not a host/with slash:colon".to_string()],
            None,
            Blacklist::new(),
        );
        let (tx, mut rx) = mpsc::channel(8);
        backend.produce(tx, CancellationToken::new()).await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
