//! File descriptor limit detection (§4.H, EMFILE handling), ported
//! from the teacher's `prtip_core::resource_limits`: the worker pool
//! opens one socket per in-flight probe, so a low `RLIMIT_NOFILE`
//! turns into spurious "too many open files" warnings well before
//! `worker_pool_size` is reached.

#[cfg(unix)]
use rlimit::Resource;

/// Raise `RLIMIT_NOFILE` to comfortably cover `worker_pool_size`
/// concurrent sockets (with headroom for the process's other file
/// descriptors), and return the soft limit actually in effect
/// afterward. Failure to raise the limit is logged, not fatal — the
/// worker pool still runs, just with more EMFILE warnings.
pub fn ensure_capacity_for(worker_pool_size: usize) -> u64 {
    let desired = (worker_pool_size as u64).saturating_mul(2).max(1024);

    #[cfg(unix)]
    {
        if let Ok((soft, hard)) = Resource::NOFILE.get() {
            if soft < desired {
                let target = desired.min(hard);
                if let Err(e) = Resource::NOFILE.set(target, hard) {
                    tracing::warn!(
                        desired,
                        current_soft = soft,
                        "failed to raise RLIMIT_NOFILE: {e}"
                    );
                }
            }
        }
        Resource::NOFILE.get().map(|(soft, _)| soft).unwrap_or(desired)
    }

    #[cfg(not(unix))]
    {
        desired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_a_positive_limit() {
        assert!(ensure_capacity_for(250) > 0);
    }

    #[test]
    fn scales_with_worker_pool_size() {
        assert!(ensure_capacity_for(10) <= ensure_capacity_for(10_000));
    }
}
