//! File sink: appends newline-delimited JSON to a file, fsyncing on a
//! periodic timer rather than after every write.

use super::{EventFilter, EventSink};
use async_trait::async_trait;
use nray_core::{Error, Event, Result};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

pub struct FileSink {
    tx: mpsc::Sender<Event>,
    worker: JoinHandle<()>,
}

impl FileSink {
    pub fn open(path: PathBuf, fsync_interval: Duration, filter: EventFilter, buffer_size: usize) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::Config(format!("failed to open output file {path:?}: {e}")))?;

        let (tx, rx) = mpsc::channel::<Event>(buffer_size);
        let worker = tokio::spawn(run_writer(file, rx, fsync_interval, filter));
        Ok(Self { tx, worker })
    }
}

async fn run_writer(
    mut file: std::fs::File,
    mut rx: mpsc::Receiver<Event>,
    fsync_interval: Duration,
    filter: EventFilter,
) {
    let mut ticker = tokio::time::interval(fsync_interval);
    let mut dirty = false;
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        if !filter.matches(&event) {
                            continue;
                        }
                        if let Err(e) = write_line(&mut file, &event) {
                            error!(error = %e, "file sink write failed");
                        } else {
                            dirty = true;
                        }
                    }
                    None => {
                        if dirty {
                            let _ = file.sync_all();
                        }
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                if dirty {
                    if let Err(e) = file.sync_all() {
                        warn!(error = %e, "periodic fsync failed");
                    }
                    dirty = false;
                }
            }
        }
    }
}

fn write_line(file: &mut std::fs::File, event: &Event) -> std::io::Result<()> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    file.write_all(line.as_bytes())
}

#[async_trait]
impl EventSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn consume(&self, event: Event) {
        if self.tx.try_send(event).is_err() {
            warn!("file sink channel full, dropping event");
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
    use std::io::Read;

    #[tokio::test]
    async fn appends_newline_delimited_json_and_flushes_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let sink = FileSink::open(
            path.clone(),
            Duration::from_secs(10),
            EventFilter::default(),
            16,
        )
        .unwrap();

        sink.consume(Event::new(
            "node-1",
            "node-a",
            EventData::PortScanResult(PortScanResult {
                target: "127.0.0.1".to_string(),
                port: 22,
                open: true,
                scan_type: ScanType::TcpConnect,
            }),
        ));
        Box::new(sink).close().await;

        let mut contents = String::new();
        std::fs::File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"port\":22"));
    }

    #[tokio::test]
    async fn filtered_out_events_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut expected = std::collections::HashMap::new();
        expected.insert("/node_id".to_string(), "someone-else".to_string());
        let sink = FileSink::open(
            path.clone(),
            Duration::from_secs(10),
            EventFilter::new(expected),
            16,
        )
        .unwrap();

        sink.consume(Event::new(
            "node-1",
            "node-a",
            EventData::PortScanResult(PortScanResult {
                target: "127.0.0.1".to_string(),
                port: 22,
                open: true,
                scan_type: ScanType::TcpConnect,
            }),
        ));
        Box::new(sink).close().await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.is_empty());
    }
}
