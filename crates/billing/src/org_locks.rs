//! Per-organization write serialization
//!
//! The identity provider only offers whole-document writes, so two events for
//! the same organization racing through fetch → reconcile → write would lose
//! one update. Holding an [`OrganizationGuard`] across that sequence makes the
//! writes for one organization run one at a time, while different
//! organizations proceed in parallel. The scope is this process only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

#[derive(Debug, Default)]
pub struct OrganizationLocks {
    locks: Arc<LockMap>,
}

impl OrganizationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task holds the lock for `organization_id`
    pub async fn acquire(&self, organization_id: &str) -> OrganizationGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(organization_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;

        OrganizationGuard {
            organization_id: organization_id.to_string(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of organizations with a held or awaited lock
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases the organization's lock on drop
#[derive(Debug)]
pub struct OrganizationGuard {
    organization_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl OrganizationGuard {
    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }
}

impl Drop for OrganizationGuard {
    fn drop(&mut self) {
        // Unlock first so the strong count below reflects only the map and waiters
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(&self.organization_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&self.organization_id);
            }
        }
    }
}
