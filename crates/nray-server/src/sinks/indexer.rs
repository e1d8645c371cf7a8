//! Bulk indexer sink: batches events and POSTs newline-delimited bulk
//! documents to an HTTP endpoint on a timer, the way a search-index
//! bulk API (e.g. Elasticsearch's `_bulk`) expects: one action line
//! followed by one document line, per event.

use super::{EventFilter, EventSink};
use async_trait::async_trait;
use nray_core::Event;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct IndexerSink {
    tx: mpsc::Sender<Event>,
    worker: JoinHandle<()>,
}

impl IndexerSink {
    pub fn new(endpoint: String, flush_interval: Duration, filter: EventFilter, buffer_size: usize) -> Self {
        let client = reqwest::Client::new();
        let (tx, rx) = mpsc::channel::<Event>(buffer_size);
        let worker = tokio::spawn(run_flusher(client, endpoint, rx, flush_interval, filter));
        Self { tx, worker }
    }
}

async fn run_flusher(
    client: reqwest::Client,
    endpoint: String,
    mut rx: mpsc::Receiver<Event>,
    flush_interval: Duration,
    filter: EventFilter,
) {
    let mut ticker = tokio::time::interval(flush_interval);
    let mut batch: Vec<Event> = Vec::new();
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        if filter.matches(&event) {
                            batch.push(event);
                        }
                    }
                    None => {
                        flush(&client, &endpoint, &mut batch).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                flush(&client, &endpoint, &mut batch).await;
            }
        }
    }
}

async fn flush(client: &reqwest::Client, endpoint: &str, batch: &mut Vec<Event>) {
    if batch.is_empty() {
        return;
    }
    let body = build_bulk_body(batch);
    let count = batch.len();
    batch.clear();
    match client
        .post(endpoint)
        .header("content-type", "application/x-ndjson")
        .body(body)
        .send()
        .await
    {
        Ok(resp) => match resp.text().await {
            Ok(text) => log_per_item_errors(&text),
            Err(e) => warn!(error = %e, "bulk indexer: failed to read response body"),
        },
        Err(e) => warn!(error = %e, count, "bulk indexer: flush request failed"),
    }
}

fn build_bulk_body(batch: &[Event]) -> String {
    let mut body = String::new();
    for event in batch {
        body.push_str(r#"{"index":{}}"#);
        body.push('\n');
        if let Ok(doc) = serde_json::to_string(event) {
            body.push_str(&doc);
        }
        body.push('\n');
    }
    body
}

/// Best-effort diagnostic: a bulk response that parses as JSON with
/// per-item `items[].index.error` entries gets those surfaced as
/// warnings; anything else is ignored (not every indexer speaks this
/// response shape, and this sink has no retry policy to drive off it).
fn log_per_item_errors(response_body: &str) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(response_body) else {
        return;
    };
    let Some(items) = value.get("items").and_then(|v| v.as_array()) else {
        return;
    };
    for item in items {
        if let Some(error) = item.pointer("/index/error") {
            warn!(error = %error, "bulk indexer: per-item error");
        }
    }
    debug!(count = items.len(), "bulk indexer: flushed batch");
}

#[async_trait]
impl EventSink for IndexerSink {
    fn name(&self) -> &str {
        "indexer"
    }

    fn consume(&self, event: Event) {
        if self.tx.try_send(event).is_err() {
            warn!("indexer sink channel full, dropping event");
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
    use nray_core::{EventData, PortScanResult, ScanType};

    #[test]
    fn bulk_body_pairs_an_action_line_with_each_document() {
        let batch = vec![Event::new(
            "node-1",
            "node-a",
            EventData::PortScanResult(PortScanResult {
                target: "127.0.0.1".to_string(),
                port: 22,
                open: true,
                scan_type: ScanType::TcpConnect,
            }),
        )];
        let body = build_bulk_body(&batch);
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"index":{}}"#);
        assert!(lines[1].contains("\"port\":22"));
    }

    #[test]
    fn per_item_errors_are_logged_without_panicking() {
        log_per_item_errors(r#"{"items":[{"index":{"error":"mapper_parsing_exception"}}]}"#);
        log_per_item_errors("not json at all");
    }
}
