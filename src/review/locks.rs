//! Per-card mutual exclusion for reviews.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock table keyed by card id. Entries hold weak references, so a card's
/// lock disappears once nobody holds or waits on it.
#[derive(Default)]
pub struct CardLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl CardLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other review of `card_id` is in flight.
    pub async fn acquire(&self, card_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(card_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(card_id.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|lock| lock.strong_count() > 0).count()
    }
}
