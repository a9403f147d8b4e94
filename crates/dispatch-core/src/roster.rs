//! Authoritative in-memory roster: unit registry, call board, and BOLOs.
//!
//! [`Roster`] holds the committed state. It is only written by the
//! mutation layer, which calls [`Roster::commit`] with a changeset the store
//! has already accepted. Everything else reads through a [`RosterView`].

use std::collections::BTreeMap;
use std::sync::Arc;

use dispatch_db::{Changeset, DbError, RosterData, RosterStore};
use dispatch_types::{
    Bolo, BoloId, Call, CallId, DepartmentId, DutyLog, RosterSnapshot, ShouldDo, StatusValue,
    SyncEvent, Unit, UnitId, UnitKind,
};
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::catalog::{CatalogError, StatusCatalog};

/// A broken roster invariant, as reported by [`Roster::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// A unit holds a status that is missing or from another department.
    #[error("unit {0} holds a status outside its department catalog")]
    ForeignStatus(UnitId),

    /// An off-roster unit is still attached to a call.
    #[error("off-roster unit {unit} is attached to call {call}")]
    OffRosterAssigned {
        /// The unit.
        unit: UnitId,
        /// The call it points at or is linked from.
        call: CallId,
    },

    /// A unit points at a call that does not exist.
    #[error("unit {unit} points at missing call {call}")]
    DanglingCall {
        /// The unit.
        unit: UnitId,
        /// The missing call.
        call: CallId,
    },

    /// A call's link set and a unit's pointer disagree.
    #[error("unit {unit} and call {call} disagree about the assignment")]
    LinkMismatch {
        /// The unit.
        unit: UnitId,
        /// The call.
        call: CallId,
    },
}

/// The committed roster.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    catalog: StatusCatalog,
    units: BTreeMap<UnitId, Unit>,
    calls: BTreeMap<CallId, Call>,
    bolos: BTreeMap<BoloId, Bolo>,
    open_duty: BTreeMap<UnitId, DutyLog>,
    revision: u64,
}

impl Roster {
    /// Build a roster from persisted data.
    ///
    /// Loaded entities start at revision 0.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the stored statuses are not a valid
    /// catalog.
    pub fn from_data(data: RosterData) -> Result<Self, CatalogError> {
        Ok(Self {
            catalog: StatusCatalog::new(data.statuses)?,
            units: data.units.into_iter().map(|u| (u.id, u)).collect(),
            calls: data.calls.into_iter().map(|c| (c.id, c)).collect(),
            bolos: data.bolos.into_iter().map(|b| (b.id, b)).collect(),
            open_duty: data
                .open_duty_logs
                .into_iter()
                .map(|log| (log.unit_id, log))
                .collect(),
            revision: 0,
        })
    }

    /// Highest committed revision.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// The status catalog.
    pub const fn catalog(&self) -> &StatusCatalog {
        &self.catalog
    }

    /// Swap in a new catalog. Callers check that no unit is orphaned.
    pub(crate) fn replace_catalog(&mut self, catalog: StatusCatalog) {
        self.catalog = catalog;
    }

    /// Look up a unit.
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Look up an open call.
    pub fn call(&self, id: CallId) -> Option<&Call> {
        self.calls.get(&id)
    }

    /// Look up an active BOLO.
    pub fn bolo(&self, id: BoloId) -> Option<&Bolo> {
        self.bolos.get(&id)
    }

    /// The open duty log of a unit, if it is on duty.
    pub fn open_duty_log(&self, unit: UnitId) -> Option<&DutyLog> {
        self.open_duty.get(&unit)
    }

    /// Every registered unit.
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    /// Every open call.
    pub fn calls(&self) -> impl Iterator<Item = &Call> {
        self.calls.values()
    }

    /// Every active BOLO.
    pub fn bolos(&self) -> impl Iterator<Item = &Bolo> {
        self.bolos.values()
    }

    /// Whether `unit` is on the active roster.
    pub fn is_active(&self, unit: &Unit) -> bool {
        self.catalog.is_on_roster(unit.status_id)
    }

    /// Whether `unit` holds a `PANIC_BUTTON` status.
    pub fn is_panicking(&self, unit: &Unit) -> bool {
        unit.status_id
            .and_then(|id| self.catalog.effect_of(id))
            .is_some_and(|effect| effect == ShouldDo::PanicButton)
    }

    /// Active units, optionally filtered by kind.
    pub fn active_units(&self, kind: Option<UnitKind>) -> Vec<Unit> {
        self.units
            .values()
            .filter(|u| kind.is_none_or(|k| u.kind == k))
            .filter(|u| self.is_active(u))
            .cloned()
            .collect()
    }

    /// Active units whose status effect is `PANIC_BUTTON`.
    pub fn panicking_units(&self) -> Vec<Unit> {
        self.units
            .values()
            .filter(|u| self.is_panicking(u))
            .cloned()
            .collect()
    }

    /// A consistent copy of everything, stamped with the current revision.
    pub fn snapshot(&self) -> RosterSnapshot {
        RosterSnapshot {
            revision: self.revision,
            units: self.units.clone(),
            calls: self.calls.clone(),
            bolos: self.bolos.clone(),
            statuses: self.catalog.all(),
        }
    }

    /// Apply a persisted changeset.
    ///
    /// Allocates the next revision, stamps it on every upserted entity, and
    /// returns the stamped changeset with its events in publish order: call
    /// upserts, unit upserts, call deletes, unit deletes, BOLO upserts, BOLO
    /// deletes. Units detached from an ended call are therefore announced
    /// before the call disappears.
    pub fn commit(&mut self, mut changes: Changeset) -> (Changeset, Vec<SyncEvent>) {
        self.revision = self.revision.saturating_add(1);
        let revision = self.revision;
        let mut events = Vec::with_capacity(changes.len());

        for call in &mut changes.calls {
            call.revision = revision;
            events.push(SyncEvent::call_upsert(call));
            self.calls.insert(call.id, call.clone());
        }
        for unit in &mut changes.units {
            unit.revision = revision;
            events.push(SyncEvent::unit_upsert(unit));
            self.units.insert(unit.id, unit.clone());
        }
        for id in &changes.deleted_calls {
            self.calls.remove(id);
            events.push(SyncEvent::call_deleted(*id, revision));
        }
        for id in &changes.deleted_units {
            self.units.remove(id);
            events.push(SyncEvent::unit_deleted(*id, revision));
        }
        for bolo in &mut changes.bolos {
            bolo.revision = revision;
            events.push(SyncEvent::bolo_upsert(bolo));
            self.bolos.insert(bolo.id, bolo.clone());
        }
        for id in &changes.deleted_bolos {
            self.bolos.remove(id);
            events.push(SyncEvent::bolo_deleted(*id, revision));
        }
        for log in &changes.duty_logs {
            if log.ended_at.is_none() {
                self.open_duty.insert(log.unit_id, log.clone());
            } else if self.open_duty.get(&log.unit_id).is_some_and(|open| open.id == log.id) {
                self.open_duty.remove(&log.unit_id);
            }
        }

        (changes, events)
    }

    /// Check the assignment and status invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for unit in self.units.values() {
            if let Some(status) = unit.status_id {
                let own = self
                    .catalog
                    .get(status)
                    .is_some_and(|s| s.department_id == unit.department_id);
                if !own {
                    return Err(InvariantViolation::ForeignStatus(unit.id));
                }
            }

            if let Some(call_id) = unit.assigned_call_id {
                if !self.is_active(unit) {
                    return Err(InvariantViolation::OffRosterAssigned {
                        unit: unit.id,
                        call: call_id,
                    });
                }
                let Some(call) = self.calls.get(&call_id) else {
                    return Err(InvariantViolation::DanglingCall {
                        unit: unit.id,
                        call: call_id,
                    });
                };
                if !call.has_unit(unit.id) {
                    return Err(InvariantViolation::LinkMismatch {
                        unit: unit.id,
                        call: call_id,
                    });
                }
            }
        }

        for call in self.calls.values() {
            for unit_id in call.unit_ids() {
                let linked = self
                    .units
                    .get(&unit_id)
                    .is_some_and(|u| u.assigned_call_id == Some(call.id));
                if !linked {
                    return Err(InvariantViolation::LinkMismatch {
                        unit: unit_id,
                        call: call.id,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Read-only handle on the committed roster.
///
/// Every method takes the read lock for the duration of one call, so each
/// result is internally consistent.
#[derive(Clone)]
pub struct RosterView {
    roster: Arc<RwLock<Roster>>,
    store: RosterStore,
}

impl RosterView {
    /// Wrap shared roster state.
    pub(crate) const fn new(roster: Arc<RwLock<Roster>>, store: RosterStore) -> Self {
        Self { roster, store }
    }

    /// Hold the read lock for several reads at once.
    pub async fn read(&self) -> RwLockReadGuard<'_, Roster> {
        self.roster.read().await
    }

    /// Highest committed revision.
    pub async fn revision(&self) -> u64 {
        self.roster.read().await.revision()
    }

    /// One department's statuses in position order.
    pub async fn list_statuses(&self, department: DepartmentId) -> Vec<StatusValue> {
        self.roster.read().await.catalog().list(department)
    }

    /// Active units, optionally filtered by kind.
    pub async fn list_active_units(&self, kind: Option<UnitKind>) -> Vec<Unit> {
        self.roster.read().await.active_units(kind)
    }

    /// Every registered unit, on duty or not.
    pub async fn list_units(&self) -> Vec<Unit> {
        self.roster.read().await.units().cloned().collect()
    }

    /// Active units with a `PANIC_BUTTON` status.
    pub async fn list_panicking_units(&self) -> Vec<Unit> {
        self.roster.read().await.panicking_units()
    }

    /// Look up a unit.
    pub async fn get_unit(&self, id: UnitId) -> Option<Unit> {
        self.roster.read().await.unit(id).cloned()
    }

    /// Every open call.
    pub async fn list_open_calls(&self) -> Vec<Call> {
        self.roster.read().await.calls().cloned().collect()
    }

    /// Look up an open call.
    pub async fn get_call(&self, id: CallId) -> Option<Call> {
        self.roster.read().await.call(id).cloned()
    }

    /// Every active BOLO.
    pub async fn list_active_bolos(&self) -> Vec<Bolo> {
        self.roster.read().await.bolos().cloned().collect()
    }

    /// Look up an active BOLO.
    pub async fn get_bolo(&self, id: BoloId) -> Option<Bolo> {
        self.roster.read().await.bolo(id).cloned()
    }

    /// A consistent copy of the whole roster.
    pub async fn snapshot(&self) -> RosterSnapshot {
        self.roster.read().await.snapshot()
    }

    /// Duty history of a unit, newest first. Served by the store, since
    /// closed periods are not kept in memory.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be read.
    pub async fn duty_logs(&self, unit: UnitId) -> Result<Vec<DutyLog>, DbError> {
        self.store.duty_logs(unit).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::Utc;
    use dispatch_types::{AssignedUnit, DivisionId, StatusId, UserId};

    use super::*;

    struct Fixture {
        dept: DepartmentId,
        on: StatusValue,
        off: StatusValue,
        panic: StatusValue,
    }

    fn fixture() -> Fixture {
        let dept = DepartmentId::new();
        let mk = |value: &str, should_do, position| StatusValue {
            id: StatusId::new(),
            value: value.into(),
            department_id: dept,
            should_do,
            position,
            color: None,
        };
        Fixture {
            dept,
            on: mk("10-8", ShouldDo::SetOnDuty, 0),
            panic: mk("Panic", ShouldDo::PanicButton, 1),
            off: mk("10-7", ShouldDo::SetOffDuty, 2),
        }
    }

    fn unit(dept: DepartmentId, kind: UnitKind, status: Option<StatusId>) -> Unit {
        Unit {
            id: UnitId::new(),
            kind,
            name: "Test".into(),
            callsign: "1".into(),
            callsign2: "01".into(),
            department_id: dept,
            division_id: DivisionId::new(),
            badge_number: None,
            status_id: status,
            assigned_call_id: None,
            suspended: false,
            user_id: UserId::new(),
            updated_at: Utc::now(),
            revision: 0,
        }
    }

    fn call() -> Call {
        Call {
            id: CallId::new(),
            name: String::new(),
            location: "Main St".into(),
            description: "Noise complaint".into(),
            created_by: UserId::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            assigned_units: Vec::new(),
            events: Vec::new(),
            revision: 0,
        }
    }

    fn roster(f: &Fixture, units: Vec<Unit>, calls: Vec<Call>) -> Roster {
        Roster::from_data(RosterData {
            statuses: vec![f.on.clone(), f.panic.clone(), f.off.clone()],
            units,
            calls,
            ..RosterData::default()
        })
        .unwrap()
    }

    #[test]
    fn active_and_panicking_filters() {
        let f = fixture();
        let on = unit(f.dept, UnitKind::Leo, Some(f.on.id));
        let panicking = unit(f.dept, UnitKind::EmsFd, Some(f.panic.id));
        let off = unit(f.dept, UnitKind::Leo, Some(f.off.id));
        let never = unit(f.dept, UnitKind::Leo, None);
        let r = roster(&f, vec![on.clone(), panicking.clone(), off, never], vec![]);

        assert_eq!(r.active_units(Some(UnitKind::Leo)), vec![on]);
        assert_eq!(r.active_units(None).len(), 2);
        assert_eq!(r.panicking_units(), vec![panicking]);
    }

    #[test]
    fn commit_stamps_one_revision_and_orders_events() {
        let f = fixture();
        let mut u = unit(f.dept, UnitKind::Leo, Some(f.on.id));
        let c = call();
        u.assigned_call_id = Some(c.id);
        let mut c_linked = c.clone();
        c_linked.assigned_units.push(AssignedUnit {
            unit_id: u.id,
            kind: u.kind,
            assigned_at: Utc::now(),
        });
        let mut r = roster(&f, vec![u.clone()], vec![c_linked]);
        r.check_invariants().unwrap();

        u.assigned_call_id = None;
        let (committed, events) = r.commit(Changeset {
            units: vec![u.clone()],
            deleted_calls: vec![c.id],
            ..Changeset::default()
        });

        assert_eq!(r.revision(), 1);
        assert_eq!(committed.units.first().unwrap().revision, 1);
        let kinds: Vec<_> = events.iter().map(SyncEvent::key).collect();
        assert_eq!(
            kinds,
            vec![
                (dispatch_types::EntityKind::Unit, u.id.into_inner()),
                (dispatch_types::EntityKind::Call, c.id.into_inner()),
            ]
        );
        assert!(events.iter().all(|e| e.revision == 1));
        r.check_invariants().unwrap();
    }

    #[test]
    fn detects_half_linked_assignment() {
        let f = fixture();
        let mut u = unit(f.dept, UnitKind::Leo, Some(f.on.id));
        let c = call();
        u.assigned_call_id = Some(c.id);
        let r = roster(&f, vec![u.clone()], vec![c.clone()]);
        assert_eq!(
            r.check_invariants(),
            Err(InvariantViolation::LinkMismatch {
                unit: u.id,
                call: c.id
            })
        );
    }

    #[test]
    fn detects_off_roster_assignment() {
        let f = fixture();
        let mut u = unit(f.dept, UnitKind::Leo, Some(f.off.id));
        let c = call();
        u.assigned_call_id = Some(c.id);
        let r = roster(&f, vec![u.clone()], vec![c.clone()]);
        assert!(matches!(
            r.check_invariants(),
            Err(InvariantViolation::OffRosterAssigned { .. })
        ));
    }

    #[test]
    fn duty_log_tracking() {
        let f = fixture();
        let u = unit(f.dept, UnitKind::Leo, Some(f.on.id));
        let mut r = roster(&f, vec![u.clone()], vec![]);
        let mut log = DutyLog {
            id: dispatch_types::DutyLogId::new(),
            unit_id: u.id,
            started_at: Utc::now(),
            ended_at: None,
        };
        r.commit(Changeset {
            duty_logs: vec![log.clone()],
            ..Changeset::default()
        });
        assert_eq!(r.open_duty_log(u.id), Some(&log));

        log.ended_at = Some(Utc::now());
        r.commit(Changeset {
            duty_logs: vec![log],
            ..Changeset::default()
        });
        assert_eq!(r.open_duty_log(u.id), None);
    }
}
