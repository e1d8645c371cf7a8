//! Subscription pipeline (§4.H): higher-level protocol scanners (SSH,
//! HTTP, HTTPS, ...) register interest against a `"<proto>/<port>"` key
//! before any batch runs. When a port scan produces an `Open` result,
//! the controller looks up subscribers for the matching key and feeds
//! each a fresh probe to run as a second wave of work in the same batch.
//!
//! No built-in protocol scanners ship yet; this module is the seam
//! external scanners attach to.

use nray_core::Event;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A protocol probe bound to one open `(host, port)`. `host` is the
/// same literal address or DNS name the port scan targeted. Returns
/// `None` when the probe produced no event worth reporting.
pub type ProtocolProbe = Arc<
    dyn Fn(String, u16) -> Pin<Box<dyn Future<Output = Option<Event>> + Send>> + Send + Sync,
>;

/// Subscribers keyed by `"<proto>/<port>"`, e.g. `"tcp/22"`.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    subscribers: HashMap<String, Vec<ProtocolProbe>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a protocol probe for `key` (e.g. `"tcp/22"`).
    pub fn subscribe(&mut self, key: impl Into<String>, probe: ProtocolProbe) {
        self.subscribers.entry(key.into()).or_default().push(probe);
    }

    /// All probes subscribed to `key`, cloned out so callers can spawn
    /// them without holding a reference into the registry.
    pub fn lookup(&self, key: &str) -> Vec<ProtocolProbe> {
        self.subscribers.get(key).cloned().unwrap_or_default()
    }
}

/// Build the `"<proto>/<port>"` subscription key a port-scan result maps to.
pub fn subscription_key(proto: &str, port: u16) -> String {
    format!("{proto}/{port}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use nray_core::EventData;

    fn probe_returning(value: &'static str) -> ProtocolProbe {
        Arc::new(move |host, port| {
            Box::pin(async move {
                Some(Event::new(
                    "node-1",
                    "node-1",
                    EventData::ProtocolScanResult(nray_core::ProtocolScanResult {
                        target: host,
                        port,
                        protocol: value.to_string(),
                        data: serde_json::Value::Null,
                    }),
                ))
            })
        })
    }

    #[test]
    fn lookup_on_unknown_key_is_empty() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.lookup("tcp/22").is_empty());
    }

    #[tokio::test]
    async fn registered_probes_run_and_report_their_protocol() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(subscription_key("tcp", 22), probe_returning("ssh"));
        registry.subscribe(subscription_key("tcp", 22), probe_returning("ssh-banner"));

        let probes = registry.lookup("tcp/22");
        assert_eq!(probes.len(), 2);

        let event = (probes[0])("127.0.0.1".to_string(), 22).await.unwrap();
        match event.data {
            EventData::ProtocolScanResult(r) => assert_eq!(r.protocol, "ssh"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn distinct_keys_do_not_cross_subscribe() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(subscription_key("tcp", 80), probe_returning("http"));
        assert!(registry.lookup("tcp/443").is_empty());
        assert_eq!(registry.lookup("tcp/80").len(), 1);
    }
}
