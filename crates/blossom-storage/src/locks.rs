//! Per-digest mutual exclusion
//!
//! Serializes the promote-or-discard step of concurrent saves and deletes
//! of the same digest. Saves of different digests never contend. Entries
//! are held weakly and pruned once no task references them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use blossom_core::Digest;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct DigestLocks {
    table: Mutex<HashMap<Digest, Weak<AsyncMutex<()>>>>,
}

impl DigestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `digest`
    pub async fn acquire(&self, digest: Digest) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table.retain(|_, weak| weak.strong_count() > 0);
            match table.get(&digest).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    table.insert(digest, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Number of digests currently locked or awaited
    pub fn active(&self) -> usize {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.values().filter(|w| w.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_digest_is_exclusive() {
        let locks = Arc::new(DigestLocks::new());
        let d = Digest::of(b"contended");

        let guard = locks.acquire(d).await;
        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.acquire(d).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_digests_do_not_contend() {
        let locks = DigestLocks::new();
        let _a = locks.acquire(Digest::of(b"a")).await;
        let _b = locks.acquire(Digest::of(b"b")).await;
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn test_entries_are_pruned() {
        let locks = DigestLocks::new();
        drop(locks.acquire(Digest::of(b"a")).await);
        assert_eq!(locks.active(), 0);
    }
}
