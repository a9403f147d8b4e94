//! In-memory roster store.
//!
//! Used by tests and by deployments that run without a database. It keeps
//! the same all-or-nothing contract as the `PostgreSQL` store and supports
//! fault injection (refusing writes, adding latency) so the mutation layer's
//! timeout and rollback paths can be exercised without a network.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dispatch_types::{
    Bolo, BoloId, Call, CallId, DutyLog, DutyLogId, StatusId, StatusValue, Unit, UnitId,
};

use crate::changeset::{Changeset, RosterData};
use crate::error::DbError;

#[derive(Debug, Default)]
struct Tables {
    statuses: BTreeMap<StatusId, StatusValue>,
    units: BTreeMap<UnitId, Unit>,
    calls: BTreeMap<CallId, Call>,
    bolos: BTreeMap<BoloId, Bolo>,
    duty_logs: BTreeMap<DutyLogId, DutyLog>,
}

/// A roster store that lives entirely in process memory.
///
/// Cloning is cheap; clones share the same tables and fault settings.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `data`.
    pub fn with_data(data: RosterData) -> Self {
        let store = Self::new();
        {
            let mut tables = store.lock();
            tables.statuses = data.statuses.into_iter().map(|s| (s.id, s)).collect();
            tables.units = data.units.into_iter().map(|u| (u.id, u)).collect();
            tables.calls = data.calls.into_iter().map(|c| (c.id, c)).collect();
            tables.bolos = data.bolos.into_iter().map(|b| (b.id, b)).collect();
            tables.duty_logs = data.open_duty_logs.into_iter().map(|d| (d.id, d)).collect();
        }
        store
    }

    /// Replace the status catalog, as the administrative value editor would.
    pub fn put_statuses(&self, statuses: Vec<StatusValue>) {
        self.lock().statuses = statuses.into_iter().map(|s| (s.id, s)).collect();
    }

    /// Make every subsequent write fail with [`DbError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent write by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the status catalog.
    pub fn load_statuses(&self) -> Vec<StatusValue> {
        self.lock().statuses.values().cloned().collect()
    }

    /// Load every table.
    pub fn load(&self) -> RosterData {
        let tables = self.lock();
        RosterData {
            statuses: tables.statuses.values().cloned().collect(),
            units: tables.units.values().cloned().collect(),
            calls: tables.calls.values().cloned().collect(),
            bolos: tables.bolos.values().cloned().collect(),
            open_duty_logs: tables
                .duty_logs
                .values()
                .filter(|log| log.ended_at.is_none())
                .cloned()
                .collect(),
        }
    }

    /// Duty history of one unit, most recent first.
    pub fn duty_logs(&self, unit_id: UnitId) -> Vec<DutyLog> {
        let mut logs: Vec<DutyLog> = self
            .lock()
            .duty_logs
            .values()
            .filter(|log| log.unit_id == unit_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        logs
    }

    /// Write a changeset atomically.
    ///
    /// The injected latency elapses before anything is written.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] when writes are being refused.
    pub async fn apply(&self, changes: &Changeset) -> Result<(), DbError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.write(changes)
    }

    /// Write a changeset, giving up if the injected latency exceeds
    /// `limit`. The write itself is never interrupted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Timeout`] if the latency overran `limit`, or
    /// [`DbError::Unavailable`] when writes are being refused.
    pub async fn apply_within(&self, changes: &Changeset, limit: Duration) -> Result<(), DbError> {
        let latency = Duration::from_millis(self.latency_ms.load(Ordering::SeqCst));
        if latency > limit {
            tokio::time::sleep(limit).await;
            return Err(DbError::Timeout(limit));
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.write(changes)
    }

    fn write(&self, changes: &Changeset) -> Result<(), DbError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("memory store is refusing writes".into()));
        }

        let mut tables = self.lock();
        for call in &changes.calls {
            tables.calls.insert(call.id, call.clone());
        }
        for unit in &changes.units {
            tables.units.insert(unit.id, unit.clone());
        }
        for id in &changes.deleted_units {
            tables.units.remove(id);
        }
        for id in &changes.deleted_calls {
            tables.calls.remove(id);
            for unit in tables.units.values_mut() {
                if unit.assigned_call_id == Some(*id) {
                    unit.assigned_call_id = None;
                }
            }
        }
        for bolo in &changes.bolos {
            tables.bolos.insert(bolo.id, bolo.clone());
        }
        for id in &changes.deleted_bolos {
            tables.bolos.remove(id);
        }
        for log in &changes.duty_logs {
            tables.duty_logs.insert(log.id, log.clone());
        }
        Ok(())
    }
}
