//! Keyed async locks for serializing work on ledger records.
//!
//! A run reads, plans and rewrites the full holdings of two accounts, so two
//! runs touching the same account must not overlap. The same lock map keyed
//! by transaction id serializes a run against the cutoff monitor. Keys are
//! taken in sorted order to rule out deadlock between callers that share
//! keys in a different order.
//!
//! Entries nobody holds or waits on are pruned whenever a lock is handed out,
//! so the map stays bounded by the number of keys in use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one unit of work; releases every key on drop.
pub struct KeyGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|held, lock| held == key || Arc::strong_count(lock) > 1);
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, keys: &[&str]) -> KeyGuard {
        let mut ordered: Vec<&str> = keys.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            guards.push(self.lock_for(key).lock_owned().await);
        }
        KeyGuard { _guards: guards }
    }

    /// Keys currently tracked, including idle ones not yet pruned.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
