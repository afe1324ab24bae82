//! Per-payment serialization of gateway work.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async locks keyed by payment external key.
///
/// Operations on one payment queue behind each other from the moment the
/// payment is loaded until its transaction is recorded. Operations on other
/// payments never touch the same lock. Entries are dropped once no caller
/// holds or waits on them.
#[derive(Debug, Clone, Default)]
pub struct PaymentLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl PaymentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the payment identified by `key`.
    pub async fn acquire(&self, key: &str) -> PaymentLockGuard {
        let lock = Arc::clone(self.locks.entry(key.to_string()).or_default().value());
        let guard = lock.lock_owned().await;
        PaymentLockGuard {
            key: key.to_string(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Number of payments currently locked or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Releases the payment lock on drop.
#[derive(Debug)]
pub struct PaymentLockGuard {
    key: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PaymentLockGuard {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining reference when
        // nobody else is waiting.
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
