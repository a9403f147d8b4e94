//! Per-entity critical sections.
//!
//! Mutations that touch the same unit, call, or BOLO run one at a time;
//! disjoint mutations run concurrently. A mutation that needs several
//! entities locks them all in one [`EntityLocks::lock`] call, which always
//! acquires in [`EntityKey`] order, so two multi-entity mutations can never
//! wait on each other in a cycle.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dispatch_types::{BoloId, CallId, UnitId};
use tokio::sync::OwnedMutexGuard;

/// An entity that can be locked.
///
/// The derived order (calls, then units, then BOLOs, each by id) is the
/// global acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKey {
    /// A call.
    Call(CallId),
    /// A unit.
    Unit(UnitId),
    /// A BOLO.
    Bolo(BoloId),
}

type Table = HashMap<EntityKey, Arc<tokio::sync::Mutex<()>>>;

/// Registry of per-entity async mutexes.
///
/// Entries are created on first use and removed again once nobody holds or
/// waits for them.
#[derive(Debug, Clone, Default)]
pub struct EntityLocks {
    table: Arc<Mutex<Table>>,
}

impl EntityLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock every key in `keys`, in order.
    pub async fn lock(&self, keys: BTreeSet<EntityKey>) -> EntityGuard {
        let mutexes: Vec<_> = {
            let mut table = self.table();
            keys.iter()
                .map(|key| Arc::clone(table.entry(*key).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }

        EntityGuard {
            keys,
            guards,
            locks: self.clone(),
        }
    }

    /// Number of entities with a live lock entry.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether no entity currently has a lock entry.
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

/// Holds a set of entity locks until dropped.
#[derive(Debug)]
pub struct EntityGuard {
    keys: BTreeSet<EntityKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    locks: EntityLocks,
}

impl EntityGuard {
    /// The keys this guard holds.
    pub const fn keys(&self) -> &BTreeSet<EntityKey> {
        &self.keys
    }
}

impl Drop for EntityGuard {
    fn drop(&mut self) {
        self.guards.clear();
        let mut table = self.locks.table();
        for key in &self.keys {
            // Only the table's own reference left: nobody holds or waits.
            if table.get(key).is_some_and(|m| Arc::strong_count(m) == 1) {
                table.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::arithmetic_side_effects)]

    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = EntityLocks::new();
        let key = EntityKey::Unit(UnitId::new());

        let guard = locks.lock(BTreeSet::from([key])).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.lock(BTreeSet::from([key])).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        let second = tokio::time::timeout(Duration::from_secs(1), contender).await;
        assert!(matches!(second, Ok(Ok(_))));
    }

    #[tokio::test]
    async fn disjoint_keys_do_not_block() {
        let locks = EntityLocks::new();
        let _a = locks.lock(BTreeSet::from([EntityKey::Unit(UnitId::new())])).await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock(BTreeSet::from([EntityKey::Call(CallId::new())])),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn overlapping_sets_in_opposite_request_order_do_not_deadlock() {
        let locks = EntityLocks::new();
        let call = EntityKey::Call(CallId::new());
        let unit = EntityKey::Unit(UnitId::new());

        let mut tasks = Vec::new();
        for i in 0..50 {
            let locks = locks.clone();
            // BTreeSet normalizes the order regardless of insertion order.
            let keys: BTreeSet<_> = if i % 2 == 0 {
                [call, unit].into_iter().collect()
            } else {
                [unit, call].into_iter().collect()
            };
            tasks.push(tokio::spawn(async move {
                let _guard = locks.lock(keys).await;
                tokio::task::yield_now().await;
            }));
        }

        let all = tokio::time::timeout(Duration::from_secs(5), async {
            for task in tasks {
                let _ = task.await;
            }
        })
        .await;
        assert!(all.is_ok());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn entries_are_pruned_after_release() {
        let locks = EntityLocks::new();
        {
            let _guard = locks
                .lock(BTreeSet::from([
                    EntityKey::Bolo(BoloId::new()),
                    EntityKey::Unit(UnitId::new()),
                ]))
                .await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }
}
