//! Backend selection for roster persistence.
//!
//! The mutation layer holds one [`RosterStore`] and never cares which
//! backend sits behind it. Enum dispatch keeps the futures `Send` without
//! boxing.

use std::time::Duration;

use dispatch_types::{DutyLog, StatusValue, UnitId};

use crate::changeset::{Changeset, RosterData};
use crate::error::DbError;
use crate::memory::MemoryStore;
use crate::postgres::PgRosterStore;

/// A roster store: in-memory or `PostgreSQL`.
#[derive(Clone)]
pub enum RosterStore {
    /// Process-local tables.
    Memory(MemoryStore),
    /// A `PostgreSQL` database.
    Postgres(PgRosterStore),
}

impl RosterStore {
    /// Short backend name for logs.
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Postgres(_) => "postgres",
        }
    }

    /// Load the whole roster.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the backend cannot be read.
    pub async fn load(&self) -> Result<RosterData, DbError> {
        match self {
            Self::Memory(store) => Ok(store.load()),
            Self::Postgres(store) => store.load().await,
        }
    }

    /// Load only the status catalog.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the backend cannot be read.
    pub async fn load_statuses(&self) -> Result<Vec<StatusValue>, DbError> {
        match self {
            Self::Memory(store) => Ok(store.load_statuses()),
            Self::Postgres(store) => store.load_statuses().await,
        }
    }

    /// Write a changeset atomically.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write is rejected; nothing is persisted.
    pub async fn apply(&self, changes: &Changeset) -> Result<(), DbError> {
        match self {
            Self::Memory(store) => store.apply(changes).await,
            Self::Postgres(store) => store.apply(changes).await,
        }
    }

    /// Write a changeset atomically, abandoning it if the work before
    /// commit takes longer than `limit`. A commit that has started is
    /// always awaited.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Timeout`] if staging overran, or another
    /// [`DbError`] if the write is rejected; nothing is persisted.
    pub async fn apply_within(&self, changes: &Changeset, limit: Duration) -> Result<(), DbError> {
        match self {
            Self::Memory(store) => store.apply_within(changes, limit).await,
            Self::Postgres(store) => store.apply_within(changes, limit).await,
        }
    }

    /// Duty history of one unit.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the backend cannot be read.
    pub async fn duty_logs(&self, unit_id: UnitId) -> Result<Vec<DutyLog>, DbError> {
        match self {
            Self::Memory(store) => Ok(store.duty_logs(unit_id)),
            Self::Postgres(store) => store.duty_logs(unit_id).await,
        }
    }
}

impl From<MemoryStore> for RosterStore {
    fn from(store: MemoryStore) -> Self {
        Self::Memory(store)
    }
}

impl From<PgRosterStore> for RosterStore {
    fn from(store: PgRosterStore) -> Self {
        Self::Postgres(store)
    }
}
