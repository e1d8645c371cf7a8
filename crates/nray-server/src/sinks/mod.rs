//! Event sinks (§4.I): typed consumers of the completed-scan event
//! stream, each with a small lifecycle contract — `consume` is
//! non-blocking (events are pushed onto the sink's own bounded
//! channel), `close` drains and flushes before returning.

mod file;
mod indexer;
mod terminal;

pub use file::FileSink;
pub use indexer::IndexerSink;
pub use terminal::TerminalSink;

use async_trait::async_trait;
use nray_core::Event;
use serde_json::Value;
use std::collections::HashMap;

/// Capability every sink implements (§9 design notes: tagged
/// interface set, not open-ended inheritance — the three concrete
/// sinks below are the only implementors this workspace ships).
#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;

    /// Enqueue one event. Never blocks the caller past the channel's
    /// buffer: a full channel drops the event with a warning rather
    /// than stalling the server message loop.
    fn consume(&self, event: Event);

    /// Wait for the sink's worker to drain its channel, flush any
    /// pending batch, and release its resources.
    async fn close(self: Box<Self>);
}

/// A sink's filter: JSON-pointer -> expected value (or `"*"` for "any
/// value, just require the pointer to resolve"). An event passes iff
/// *some* configured key matches; an empty map passes everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    expected: HashMap<String, String>,
}

impl EventFilter {
    pub fn new(expected: HashMap<String, String>) -> Self {
        Self { expected }
    }

    pub fn matches(&self, event: &Event) -> bool {
        if self.expected.is_empty() {
            return true;
        }
        let value = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(_) => return false,
        };
        self.expected.iter().any(|(pointer, expected)| {
            match value.pointer(pointer) {
                Some(Value::String(s)) => expected == "*" || s == expected,
                Some(other) => expected == "*" || other.to_string().trim_matches('"') == expected,
                None => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nray_core::{EventData, PortScanResult, ScanType};

    fn sample_event() -> Event {
        Event::new(
            "node-1",
            "node-a",
            EventData::PortScanResult(PortScanResult {
                target: "127.0.0.1".to_string(),
                port: 22,
                open: true,
                scan_type: ScanType::TcpConnect,
            }),
        )
    }

    #[test]
    fn empty_filter_passes_everything() {
        let filter = EventFilter::default();
        assert!(filter.matches(&sample_event()));
    }

    #[test]
    fn filter_matches_on_any_configured_key() {
        let mut expected = HashMap::new();
        expected.insert("/node_id".to_string(), "node-1".to_string());
        expected.insert("/data/port".to_string(), "9999".to_string());
        let filter = EventFilter::new(expected);
        assert!(filter.matches(&sample_event()));
    }

    #[test]
    fn filter_rejects_when_no_key_matches() {
        let mut expected = HashMap::new();
        expected.insert("/node_id".to_string(), "node-2".to_string());
        let filter = EventFilter::new(expected);
        assert!(!filter.matches(&sample_event()));
    }

    #[test]
    fn wildcard_value_matches_any_present_pointer() {
        let mut expected = HashMap::new();
        expected.insert("/node_id".to_string(), "*".to_string());
        let filter = EventFilter::new(expected);
        assert!(filter.matches(&sample_event()));
    }
}
