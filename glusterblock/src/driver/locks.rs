//! Per-volume operation locks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async mutex per volume name.
///
/// Operations on different names never contend; operations on one name run
/// strictly one after another.
#[derive(Debug, Default)]
pub(crate) struct VolumeLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl VolumeLocks {
    /// Wait for exclusive access to `name`.
    pub(crate) async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(name.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop the entry for `name` if nobody else holds or waits for it.
    ///
    /// Called with the caller's own guard still alive, which accounts for
    /// one reference besides the table's.
    pub(crate) fn forget(&self, name: &str) {
        let mut locks = self.locks.lock();
        let idle = locks
            .get(name)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2);
        if idle {
            locks.remove(name);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_is_serialized() {
        let locks = Arc::new(VolumeLocks::default());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let active = Arc::clone(&active);
                let max_active = Arc::clone(&max_active);
                tokio::spawn(async move {
                    let _guard = locks.lock("db").await;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_names_do_not_block() {
        let locks = VolumeLocks::default();
        let _db = locks.lock("db").await;
        let logs = tokio::time::timeout(Duration::from_secs(1), locks.lock("logs")).await;
        assert!(logs.is_ok());
    }

    #[tokio::test]
    async fn test_forget_keeps_contended_entries() {
        let locks = Arc::new(VolumeLocks::default());
        let guard = locks.lock("db").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("db").await;
            })
        };
        // let the waiter clone the entry
        tokio::time::sleep(Duration::from_millis(20)).await;

        locks.forget("db");
        assert_eq!(locks.len(), 1);

        drop(guard);
        waiter.await.unwrap();

        let guard = locks.lock("db").await;
        locks.forget("db");
        assert_eq!(locks.len(), 0);
        drop(guard);
    }
}
