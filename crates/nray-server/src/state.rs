//! `ServerContext`: the global state described in spec.md §3 — listen
//! endpoints, TLS config, the ordered list of pools, and the
//! registered sinks. Created once at startup and threaded through
//! every entry point (no module-level statics), per the design notes.

use crate::pool::Pool;
use crate::sinks::EventSink;
use nray_core::{Event, ServerConfig};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct ServerContext {
    pub config: ServerConfig,
    pub pools: Vec<Arc<Pool>>,
    sinks: Mutex<Vec<Box<dyn EventSink>>>,
}

impl ServerContext {
    pub fn new(config: ServerConfig, pools: Vec<Arc<Pool>>, sinks: Vec<Box<dyn EventSink>>) -> Arc<Self> {
        Arc::new(Self {
            config,
            pools,
            sinks: Mutex::new(sinks),
        })
    }

    /// Fan an event out to every registered sink, in receive order.
    /// Each sink's own channel preserves that order internally.
    pub fn fan_out(&self, event: Event) {
        for sink in self.sinks.lock().iter() {
            sink.consume(event.clone());
        }
    }

    /// Drain and close every sink. Idempotent: a second call finds an
    /// empty list and closes nothing.
    pub async fn close_sinks(&self) {
        let sinks = std::mem::take(&mut *self.sinks.lock());
        for sink in sinks {
            sink.close().await;
        }
    }

    /// Terminal iff every pool is terminal (generation done, no active
    /// jobs) and every pool's node table is empty.
    pub fn is_fully_drained(&self) -> bool {
        self.pools.iter().all(|p| p.is_terminal() && p.node_count() == 0)
    }

    pub fn all_pools_terminal(&self) -> bool {
        self.pools.iter().all(|p| p.is_terminal())
    }
}
