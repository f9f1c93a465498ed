//! Per-user sync serialisation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// One async mutex per user id.
///
/// Syncs for the same user queue behind each other; different users never
/// contend. A user's entry is dropped once no guard holds it and nobody is
/// waiting on it.
#[derive(Debug, Clone, Default)]
pub struct UserLocks {
    locks: LockMap,
}

/// Held while a user's sync is in flight.
#[derive(Debug)]
pub struct UserGuard {
    user_id: String,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        // The guard owns a handle to the mutex; release it before counting.
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.user_id);
        }
    }
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn guard(&self, user_id: &str, guard: OwnedMutexGuard<()>) -> UserGuard {
        UserGuard {
            user_id: user_id.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Waits until no other sync holds `user_id`.
    pub async fn acquire(&self, user_id: &str) -> UserGuard {
        let guard = self.lock_for(user_id).lock_owned().await;
        self.guard(user_id, guard)
    }

    /// Returns `None` if a sync for `user_id` is already in flight.
    pub fn try_acquire(&self, user_id: &str) -> Option<UserGuard> {
        let guard = self.lock_for(user_id).try_lock_owned().ok()?;
        Some(self.guard(user_id, guard))
    }

    /// Number of users with a held or awaited lock.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
