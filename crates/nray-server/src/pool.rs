//! Pool & job manager (§4.E): nodes and jobs for one coordination
//! domain, plus the background tasks that keep it fed and healthy.
//!
//! Arena + stable-id discipline per the design notes: a pool owns its
//! nodes in a hash-keyed table and its jobs in a vector, and jobs refer
//! to nodes by id rather than by reference. Every field that §5 calls
//! out as independently locked gets its own lock here: node table
//! behind a `parking_lot::RwLock`, job list behind a
//! `parking_lot::Mutex`, progress counters behind their own `RwLock`.

use crate::progress::Progress;
use chrono::{DateTime, Utc};
use nray_core::{AnyTargets, Error, Job, JobState, Node, Result};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::info;

/// One coordination domain: a job-generation stream, the jobs it has
/// produced so far, and the nodes working them.
pub struct Pool {
    pub index: usize,
    nodes: RwLock<HashMap<String, Node>>,
    jobs: Mutex<Vec<Job>>,
    progress: RwLock<Progress>,
    generation_done: AtomicBool,
    batches: Mutex<Option<mpsc::Receiver<AnyTargets>>>,
}

impl Pool {
    pub fn new(index: usize, batches: mpsc::Receiver<AnyTargets>) -> Self {
        Self {
            index,
            nodes: RwLock::new(HashMap::new()),
            jobs: Mutex::new(Vec::new()),
            progress: RwLock::new(Progress::default()),
            generation_done: AtomicBool::new(false),
            batches: Mutex::new(Some(batches)),
        }
    }

    // -- node table -------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn has_node(&self, node_id: &str) -> bool {
        self.nodes.read().contains_key(node_id)
    }

    pub fn get_node(&self, node_id: &str) -> Option<Node> {
        self.nodes.read().get(node_id).cloned()
    }

    pub fn insert_node(&self, node: Node) {
        self.nodes.write().insert(node.id.clone(), node);
    }

    /// Graceful removal (`Goodbye`): refused while the node still has
    /// an in-progress job. Returns whether removal succeeded.
    pub fn remove_node_graceful(&self, node_id: &str) -> bool {
        let jobs = self.jobs.lock();
        let still_working = jobs
            .iter()
            .any(|j| j.state == JobState::InProgress && j.is_assigned_to(node_id));
        drop(jobs);
        if still_working {
            return false;
        }
        self.nodes.write().remove(node_id).is_some()
    }

    /// Forced removal (expiry or server-initiated): rescue every job
    /// assigned to this node back to `Waiting` before deleting the
    /// node record, so no job is left `InProgress` with an absent
    /// assignee.
    pub fn remove_node_forced(&self, node_id: &str) {
        let mut jobs = self.jobs.lock();
        for job in jobs.iter_mut() {
            if job.is_assigned_to(node_id) {
                job.reset();
            }
        }
        drop(jobs);
        self.nodes.write().remove(node_id);
    }

    pub fn touch_heartbeat(&self, node_id: &str, beat_time: DateTime<Utc>) -> bool {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(node_id) {
            Some(node) => {
                node.last_heartbeat = beat_time;
                true
            }
            None => false,
        }
    }

    pub fn set_should_stop(&self, node_id: &str, should_stop: bool) {
        if let Some(node) = self.nodes.write().get_mut(node_id) {
            node.should_stop = should_stop;
        }
    }

    pub fn set_scan_paused(&self, node_id: &str, paused: bool) {
        if let Some(node) = self.nodes.write().get_mut(node_id) {
            node.scan_paused = paused;
        }
    }

    /// Set (or clear) `should_stop` on every node in the pool — the
    /// terminal-detection loop's and the SIGINT drain's graceful-stop
    /// signal.
    pub fn stop_all_nodes(&self) {
        for node in self.nodes.write().values_mut() {
            node.should_stop = true;
        }
    }

    /// Evict every node whose last heartbeat is older than
    /// `expiry_time`. Returns the evicted node ids for logging.
    pub fn expire_stale_nodes(&self, expiry_time: chrono::Duration) -> Vec<String> {
        let cutoff = Utc::now() - expiry_time;
        let stale: Vec<String> = self
            .nodes
            .read()
            .values()
            .filter(|n| n.last_heartbeat < cutoff)
            .map(|n| n.id.clone())
            .collect();
        for id in &stale {
            self.remove_node_forced(id);
        }
        stale
    }

    // -- job area -----------------------------------------------------

    pub fn waiting_count(&self) -> usize {
        self.jobs
            .lock()
            .iter()
            .filter(|j| j.state == JobState::Waiting)
            .count()
    }

    pub fn active_job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Pull batches off the pool's source until at least `min_waiting`
    /// jobs are `Waiting`, wrapping each in a freshly-id'd `Job`. Runs
    /// until the batch channel closes, at which point `generation_done`
    /// is set and the task returns.
    pub async fn run_job_generator(&self, min_waiting: usize) {
        loop {
            if self.waiting_count() >= min_waiting {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                continue;
            }
            // Take the receiver out of the lock before awaiting on it: a
            // `parking_lot::MutexGuard` is `!Send`, and holding one across
            // an `.await` would make this function's future `!Send`,
            // which `tokio::spawn` (run.rs) requires.
            let Some(mut rx) = self.batches.lock().take() else {
                return;
            };
            let received = rx.recv().await;
            match received {
                Some(targets) => {
                    *self.batches.lock() = Some(rx);
                    let mut total = self.progress.write();
                    total.total_targets += targets.target_count();
                    drop(total);
                    self.jobs.lock().push(Job::new(targets));
                }
                None => {
                    self.generation_done.store(true, Ordering::SeqCst);
                    info!(pool = self.index, "target generation complete for pool");
                    return;
                }
            }
        }
    }

    pub fn generation_done(&self) -> bool {
        self.generation_done.load(Ordering::SeqCst)
    }

    /// A pool is terminal once generation is done and its active job
    /// list is empty — every produced job has been completed. Used by
    /// the terminal-detection loop and graceful drain (§4.F).
    pub fn is_terminal(&self) -> bool {
        self.generation_done() && self.jobs.lock().is_empty()
    }

    /// Heartbeat dispatch's `should_stop` trigger (§4.F rule 3):
    /// generation done and zero `Waiting` jobs left to hand out. Unlike
    /// `is_terminal`, this is satisfied while jobs are still
    /// `InProgress` on other nodes — there's simply nothing left to
    /// assign, so this node can be told to stop pulling more work even
    /// though the pool as a whole isn't done draining yet.
    pub fn no_more_work_to_assign(&self) -> bool {
        self.generation_done() && self.waiting_count() == 0
    }

    /// `GetJobForNode`: idempotent re-delivery of a job already
    /// assigned to this node, else the first `Waiting` job in list
    /// order flipped to `InProgress`.
    pub fn get_job_for_node(&self, node_id: &str) -> Option<Job> {
        let mut jobs = self.jobs.lock();
        if let Some(existing) = jobs.iter().find(|j| j.is_assigned_to(node_id)) {
            return Some(existing.clone());
        }
        let job = jobs.iter_mut().find(|j| j.state == JobState::Waiting)?;
        job.assign(node_id);
        Some(job.clone())
    }

    /// `removeJob`: completion of `(node_id, job_id)`. Returns the
    /// completed job's target count on success, or an error on a
    /// duplicate completion (expected, non-fatal on retries).
    pub fn complete_job(&self, node_id: &str, job_id: u64) -> Result<u64> {
        let mut jobs = self.jobs.lock();
        let position = jobs
            .iter()
            .position(|j| j.id == job_id && j.is_assigned_to(node_id));
        match position {
            Some(idx) => {
                let job = jobs.remove(idx);
                drop(jobs);
                let count = job.targets.target_count();
                self.progress.write().done_targets += count;
                Ok(count)
            }
            None => Err(Error::Pool(format!(
                "no in-progress job {job_id} assigned to node {node_id} (duplicate completion?)"
            ))),
        }
    }

    pub fn progress(&self) -> Progress {
        *self.progress.read()
    }
}

/// Load-balancing tie-break for new registrations: the pool with the
/// fewest current members, earliest index wins ties.
pub fn smallest_pool(pools: &[std::sync::Arc<Pool>]) -> Option<std::sync::Arc<Pool>> {
    pools
        .iter()
        .min_by_key(|p| p.node_count())
        .cloned()
}

/// Generate a fresh random 64-bit hex node id, retrying on collision
/// against the supplied pools (the `allow_multiple_per_host` path).
pub fn fresh_random_node_id(pools: &[std::sync::Arc<Pool>]) -> String {
    loop {
        let candidate: u64 = rand::thread_rng().gen();
        let hex = format!("{candidate:016x}");
        if !pools.iter().any(|p| p.has_node(&hex)) {
            return hex;
        }
    }
}

/// Whether `machine_id` is already registered in any pool — the
/// `allow_multiple_per_host = false` duplicate check.
pub fn machine_id_registered(pools: &[std::sync::Arc<Pool>], machine_id: &str) -> bool {
    pools.iter().any(|p| p.has_node(machine_id))
}

pub fn find_pool_with_node<'a>(
    pools: &'a [std::sync::Arc<Pool>],
    node_id: &str,
) -> Option<&'a std::sync::Arc<Pool>> {
    pools.iter().find(|p| p.has_node(node_id))
}
