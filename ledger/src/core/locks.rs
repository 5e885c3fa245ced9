// Keyed mutual exclusion for ledger mutations.
//
// Every balance mutation holds the lock of each wallet it touches for the
// whole read-modify-commit cycle. Keys are always acquired in sorted order
// against a single deadline: a caller that cannot get every key in time
// releases what it holds and reports a retryable timeout.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use dashmap::DashMap;
use log::{debug, trace};
use nodeshare_common::{crypto::{Address, Hash}, referral::PurchaseId};
use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    time::{timeout_at, Instant},
};

use crate::core::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Purchase(PurchaseId),
    Withdrawal(Hash),
    Wallet(Address),
}

type LockMap = DashMap<LockKey, Arc<Mutex<()>>>;

pub struct LockManager {
    locks: Arc<LockMap>,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquire every key or none of them
    pub async fn acquire<I>(&self, keys: I) -> Result<LockSet, LedgerError>
    where
        I: IntoIterator<Item = LockKey>,
    {
        let keys: BTreeSet<LockKey> = keys.into_iter().collect();
        let deadline = Instant::now() + self.timeout;

        let mut set = LockSet {
            locks: self.locks.clone(),
            guards: Vec::with_capacity(keys.len()),
        };

        for key in keys {
            let mutex = self.locks.entry(key.clone()).or_default().clone();
            match timeout_at(deadline, mutex.lock_owned()).await {
                Ok(guard) => set.guards.push((key, guard)),
                Err(_) => {
                    if log::log_enabled!(log::Level::Debug) {
                        debug!(
                            "timed out waiting for {:?} after {:?}, releasing {} held locks",
                            key,
                            self.timeout,
                            set.guards.len()
                        );
                    }
                    // the timed out future already dropped its handle
                    prune(&self.locks, &key);
                    return Err(LedgerError::LockTimeout(self.timeout));
                }
            }
        }

        if log::log_enabled!(log::Level::Trace) {
            trace!("acquired {} ledger locks", set.guards.len());
        }

        Ok(set)
    }

    // Number of keys currently tracked
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

// Remove the entry if nobody else holds or waits on it
fn prune(locks: &LockMap, key: &LockKey) {
    locks.remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
}

/// Held locks, released on drop
pub struct LockSet {
    locks: Arc<LockMap>,
    guards: Vec<(LockKey, OwnedMutexGuard<()>)>,
}

impl LockSet {
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn holds(&self, key: &LockKey) -> bool {
        self.guards.iter().any(|(k, _)| k == key)
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        for (key, guard) in self.guards.drain(..).rev() {
            drop(guard);
            prune(&self.locks, &key);
        }
    }
}
