//! TCP connect-probe scanner (§4.H): attempt a full connection within
//! a timeout. "Too many open files" is logged as a warning, not
//! treated as fatal — it signals too many concurrent workers, not a
//! closed port, so it produces no result at all rather than a false
//! "closed".

use nray_core::{PortScanResult, ScanType};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::warn;

/// Attempt a TCP connect to `(host, port)`. `host` may be a literal
/// address or a DNS name; resolution happens inside `TcpStream::connect`.
/// Returns `None` on resource exhaustion (the probe produced no signal
/// either way); otherwise `Some` with `open` reflecting whether the
/// handshake completed before `probe_timeout`.
pub async fn probe(host: &str, port: u16, probe_timeout: Duration) -> Option<PortScanResult> {
    match timeout(probe_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => Some(PortScanResult {
            target: host.to_string(),
            port,
            open: true,
            scan_type: ScanType::TcpConnect,
        }),
        Ok(Err(e)) if is_too_many_open_files(&e) => {
            warn!(host = %host, port, "too many open files during TCP connect probe");
            None
        }
        Ok(Err(_)) | Err(_) => Some(PortScanResult {
            target: host.to_string(),
            port,
            open: false,
            scan_type: ScanType::TcpConnect,
        }),
    }
}

fn is_too_many_open_files(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc_emfile())
}

/// `EMFILE` is platform-specific; hardcode the common Unix value
/// rather than pulling in `libc` for a single constant.
fn libc_emfile() -> i32 {
    24
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_port_reports_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let result = probe("127.0.0.1", port, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(result.open);
        assert_eq!(result.port, port);
    }

    #[tokio::test]
    async fn closed_port_reports_closed() {
        // Bind then drop to free the port without anything listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = probe("127.0.0.1", port, Duration::from_millis(300))
            .await
            .unwrap();
        assert!(!result.open);
    }
}
