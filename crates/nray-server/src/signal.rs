//! SIGINT escalation (§4.F): first Ctrl-C begins a graceful drain,
//! the second warns the operator that a drain is already underway,
//! the third forces an immediate exit.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Spawns the Ctrl-C listener and returns a token that cancels once
/// the first SIGINT arrives — callers select on it to start draining.
pub fn install(drain: CancellationToken) -> Arc<AtomicU32> {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_task = counter.clone();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            let n = counter_task.fetch_add(1, Ordering::SeqCst) + 1;
            match n {
                1 => {
                    warn!("SIGINT received, beginning graceful drain (press Ctrl-C again to check status, a third time to force exit)");
                    drain.cancel();
                }
                2 => {
                    warn!("graceful drain already in progress; a third Ctrl-C will force-exit");
                }
                _ => {
                    warn!("forcing immediate exit");
                    std::process::exit(1);
                }
            }
        }
    });
    counter
}
