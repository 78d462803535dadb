use std::collections::HashMap;
use std::fmt;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanKind {
    Full,
    Targeted,
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanKind::Full => f.write_str("full"),
            ScanKind::Targeted => f.write_str("targeted"),
        }
    }
}

/// Per-subtree mutual exclusion between the scan loops.
///
/// Holding the lock for a top-level subtree id means the holder is the only
/// one deleting or writing nodes of that subtree. Waiters block on a
/// condition variable and log periodically while they wait.
#[derive(Debug)]
pub struct SubtreeLocks {
    held: Mutex<HashMap<i64, ScanKind>>,
    released: Condvar,
    wait_log_interval: Duration,
}

impl SubtreeLocks {
    pub fn new(wait_log_interval: Duration) -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            wait_log_interval: wait_log_interval.max(Duration::from_millis(1)),
        }
    }

    /// Blocks until `top_level_id` is free, then claims it for `kind`.
    pub fn acquire(&self, top_level_id: i64, kind: ScanKind) -> SubtreeGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let mut waiting_since: Option<Instant> = None;

        while let Some(holder) = held.get(&top_level_id).copied() {
            let since = *waiting_since.get_or_insert_with(|| {
                info!(
                    "{} scan waiting for {} scan of subtree {} to finish",
                    kind, holder, top_level_id
                );
                Instant::now()
            });
            let (guard, timeout) = self
                .released
                .wait_timeout(held, self.wait_log_interval)
                .unwrap_or_else(PoisonError::into_inner);
            held = guard;
            if timeout.timed_out() && held.contains_key(&top_level_id) {
                info!(
                    "{} scan still waiting on subtree {} ({:.0}s)",
                    kind,
                    top_level_id,
                    since.elapsed().as_secs_f64()
                );
            }
        }

        held.insert(top_level_id, kind);
        debug!("{} scan holds subtree {}", kind, top_level_id);
        SubtreeGuard {
            locks: self,
            top_level_id,
            kind,
        }
    }

    /// Loop currently holding `top_level_id`, if any.
    pub fn holder(&self, top_level_id: i64) -> Option<ScanKind> {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&top_level_id)
            .copied()
    }

    fn release(&self, top_level_id: i64) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&top_level_id);
        self.released.notify_all();
    }
}

/// Releases the subtree when dropped, including on early return or panic.
#[derive(Debug)]
pub struct SubtreeGuard<'a> {
    locks: &'a SubtreeLocks,
    top_level_id: i64,
    kind: ScanKind,
}

impl Drop for SubtreeGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(self.top_level_id);
        debug!("{} scan released subtree {}", self.kind, self.top_level_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_guard_releases_on_drop() {
        let locks = SubtreeLocks::new(Duration::from_secs(5));
        {
            let _guard = locks.acquire(7, ScanKind::Full);
            assert_eq!(locks.holder(7), Some(ScanKind::Full));
        }
        assert_eq!(locks.holder(7), None);
        let _guard = locks.acquire(7, ScanKind::Targeted);
        assert_eq!(locks.holder(7), Some(ScanKind::Targeted));
    }

    #[test]
    fn test_different_subtrees_do_not_contend() {
        let locks = SubtreeLocks::new(Duration::from_secs(5));
        let _full = locks.acquire(1, ScanKind::Full);
        let _targeted = locks.acquire(2, ScanKind::Targeted);
        assert_eq!(locks.holder(1), Some(ScanKind::Full));
        assert_eq!(locks.holder(2), Some(ScanKind::Targeted));
    }

    #[test]
    fn test_waiter_proceeds_after_release() {
        let locks = Arc::new(SubtreeLocks::new(Duration::from_millis(10)));
        let acquired = Arc::new(AtomicBool::new(false));

        let guard = locks.acquire(3, ScanKind::Full);
        let waiter = {
            let locks = Arc::clone(&locks);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _guard = locks.acquire(3, ScanKind::Targeted);
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(guard);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(locks.holder(3), None);
    }

    #[test]
    fn test_panicking_holder_releases() {
        let locks = Arc::new(SubtreeLocks::new(Duration::from_secs(5)));
        let result = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let _guard = locks.acquire(9, ScanKind::Full);
                panic!("walk blew up");
            })
            .join()
        };
        assert!(result.is_err());
        assert_eq!(locks.holder(9), None);
    }
}
