//! Terminal sink: formats and logs one line per event.

use super::{EventFilter, EventSink};
use async_trait::async_trait;
use nray_core::{Event, EventData};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct TerminalSink {
    tx: mpsc::Sender<Event>,
    worker: JoinHandle<()>,
}

impl TerminalSink {
    pub fn new(filter: EventFilter, buffer_size: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Event>(buffer_size);
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !filter.matches(&event) {
                    continue;
                }
                info!("{}", format_line(&event));
            }
        });
        Self { tx, worker }
    }
}

fn format_line(event: &Event) -> String {
    match &event.data {
        EventData::EnvironmentInfo(info) => format!(
            "[{}] node {} ({}) registered: {} / {}",
            event.timestamp, event.node_id, event.node_name, info.hostname, info.os
        ),
        EventData::PortScanResult(r) => format!(
            "[{}] {} {}:{} -> {}",
            event.timestamp,
            event.node_name,
            r.target,
            r.port,
            if r.open { "open" } else { "closed" }
        ),
        EventData::ProtocolScanResult(r) => format!(
            "[{}] {} {}:{} [{}] {}",
            event.timestamp, event.node_name, r.target, r.port, r.protocol, r.data
        ),
    }
}

#[async_trait]
impl EventSink for TerminalSink {
    fn name(&self) -> &str {
        "terminal"
    }

    fn consume(&self, event: Event) {
        if self.tx.try_send(event).is_err() {
            tracing::warn!("terminal sink channel full, dropping event");
        }
    }

    async fn close(self: Box<Self>) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nray_core::{PortScanResult, ScanType};

    #[tokio::test]
    async fn formats_a_port_scan_result_line() {
        let event = Event::new(
            "node-1",
            "node-a",
            EventData::PortScanResult(PortScanResult {
                target: "127.0.0.1".to_string(),
                port: 22,
                open: true,
                scan_type: ScanType::TcpConnect,
            }),
        );
        let line = format_line(&event);
        assert!(line.contains("127.0.0.1:22"));
        assert!(line.contains("open"));
    }

    #[tokio::test]
    async fn close_drains_pending_events_before_returning() {
        let sink = TerminalSink::new(EventFilter::default(), 8);
        sink.consume(Event::new(
            "node-1",
            "node-a",
            EventData::PortScanResult(PortScanResult {
                target: "127.0.0.1".to_string(),
                port: 80,
                open: false,
                scan_type: ScanType::TcpConnect,
            }),
        ));
        Box::new(sink).close().await;
    }
}
