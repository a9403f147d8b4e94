//! The only write path into the roster.
//!
//! Every operation runs the same pipeline:
//!
//! ```text
//! lock entities ──> validate & plan ──> persist (timeout) ──> commit ──> broadcast
//!   (EntityLocks)     (read lock)         (RosterStore)      (write lock + revision)
//! ```
//!
//! Planning produces a [`Changeset`] holding the full post-mutation rows.
//! Once planning succeeds, persisting, committing, and broadcasting run on
//! a detached task that owns the entity locks, so a caller that goes away
//! mid-request cannot leave a mutation half done. If the store fails or
//! times out, nothing is committed and nothing is broadcast.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dispatch_db::{Changeset, RosterStore};
use dispatch_types::{
    Actor, AssignedUnit, Bolo, BoloId, BoloPayload, Call, CallEvent, CallEventId,
    CallEventPayload, CallId, CallPayload, DepartmentId, DutyLog, DutyLogId, ShouldDo, StatusId,
    StatusValue, SyncEvent, Unit, UnitId, UnitPayload,
};
use serde::Serialize;
use tokio::sync::RwLock;
use validator::Validate;

use crate::broadcast::Broadcaster;
use crate::catalog::StatusCatalog;
use crate::error::{LoadError, MutationError};
use crate::locks::{EntityKey, EntityLocks};
use crate::roster::{Roster, RosterView};

/// How many times a mutation re-reads its lock set before giving up.
const MAX_LOCK_ATTEMPTS: usize = 8;

/// A successful mutation: the resulting entity and what was broadcast.
///
/// `events` is empty when the request changed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome<T> {
    /// The entity after the mutation (or the id, for deletes).
    pub entity: T,
    /// Events published for this mutation, in publish order.
    pub events: Vec<SyncEvent>,
}

enum Plan<T> {
    Unchanged(T),
    Apply(Changeset),
}

type Keys = Result<BTreeSet<EntityKey>, MutationError>;
type Planned<T> = Result<Plan<T>, MutationError>;

enum Applied<T> {
    Unchanged(T),
    Committed(Changeset, Vec<SyncEvent>),
}

impl<T> Applied<T> {
    fn finish(
        self,
        pick: impl FnOnce(Changeset) -> Option<T>,
    ) -> Result<MutationOutcome<T>, MutationError> {
        match self {
            Self::Unchanged(entity) => Ok(MutationOutcome {
                entity,
                events: Vec::new(),
            }),
            Self::Committed(changes, events) => {
                let entity = pick(changes).ok_or_else(|| {
                    MutationError::Unavailable("committed changeset lost its result".into())
                })?;
                Ok(MutationOutcome { entity, events })
            }
        }
    }
}

struct Inner {
    roster: Arc<RwLock<Roster>>,
    store: RosterStore,
    broadcaster: Broadcaster,
    locks: EntityLocks,
    catalog_gate: Arc<RwLock<()>>,
    persist_timeout: Duration,
}

/// Validated roster transitions.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct MutationApi {
    inner: Arc<Inner>,
}

impl MutationApi {
    /// Load the roster from `store` and build the mutation layer around it.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the store cannot be read or its statuses
    /// are not a valid catalog.
    pub async fn load(
        store: RosterStore,
        broadcaster: Broadcaster,
        persist_timeout: Duration,
    ) -> Result<Self, LoadError> {
        let data = store.load().await?;
        let roster = Roster::from_data(data)?;
        if let Err(violation) = roster.check_invariants() {
            tracing::warn!(%violation, "Loaded roster violates an invariant");
        }
        tracing::info!(
            backend = store.backend(),
            units = roster.units().count(),
            calls = roster.calls().count(),
            bolos = roster.bolos().count(),
            statuses = roster.catalog().len(),
            "Roster loaded"
        );
        Ok(Self::with_roster(roster, store, broadcaster, persist_timeout))
    }

    /// Build the mutation layer around an already loaded roster.
    pub fn with_roster(
        roster: Roster,
        store: RosterStore,
        broadcaster: Broadcaster,
        persist_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                roster: Arc::new(RwLock::new(roster)),
                store,
                broadcaster,
                locks: EntityLocks::new(),
                catalog_gate: Arc::new(RwLock::new(())),
                persist_timeout,
            }),
        }
    }

    /// Read-only handle on the committed roster.
    pub fn view(&self) -> RosterView {
        RosterView::new(Arc::clone(&self.inner.roster), self.inner.store.clone())
    }

    /// The broadcaster this layer publishes to.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.inner.broadcaster
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    async fn run<T, K, P>(
        &self,
        op: &'static str,
        keys: K,
        plan: P,
    ) -> Result<Applied<T>, MutationError>
    where
        T: Send,
        K: Fn(&Roster) -> Keys + Send + Sync,
        P: FnOnce(&Roster) -> Planned<T> + Send,
    {
        let gate = Arc::clone(&self.inner.catalog_gate).read_owned().await;

        let mut attempt = 0_usize;
        let (guard, roster) = loop {
            attempt = attempt.saturating_add(1);
            let wanted = keys(&*self.inner.roster.read().await)?;
            let guard = self.inner.locks.lock(wanted).await;
            let roster = self.inner.roster.read().await;
            // Something we read to choose the keys may have moved while we
            // waited; lock the new set instead.
            if &keys(&roster)? == guard.keys() {
                break (guard, roster);
            }
            drop(roster);
            drop(guard);
            if attempt >= MAX_LOCK_ATTEMPTS {
                return Err(MutationError::Conflict(
                    "entities kept changing while locking; retry".into(),
                ));
            }
        };

        let planned = plan(&roster);
        drop(roster);
        let changes = match planned? {
            Plan::Unchanged(entity) => {
                tracing::debug!(op, "Mutation changed nothing");
                return Ok(Applied::Unchanged(entity));
            }
            Plan::Apply(changes) => changes,
        };

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner.persist_and_commit(op, changes).await;
            drop(guard);
            drop(gate);
            result
        });
        let (committed, events) = task
            .await
            .map_err(|e| MutationError::Unavailable(format!("mutation task failed: {e}")))??;
        Ok(Applied::Committed(committed, events))
    }

    // -----------------------------------------------------------------------
    // Units
    // -----------------------------------------------------------------------

    /// Change a unit's status.
    ///
    /// Going off duty detaches the unit from its call in the same
    /// transaction. Selecting the current status again changes nothing.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown unit or status, `Forbidden` if the actor
    /// neither owns the unit nor dispatches or the unit is suspended,
    /// `Invalid` for another department's status or for anything but the
    /// on-duty status while the unit is off the roster, `Unavailable` on
    /// store failure.
    pub async fn set_unit_status(
        &self,
        unit_id: UnitId,
        status_id: StatusId,
        actor: Actor,
    ) -> Result<MutationOutcome<Unit>, MutationError> {
        let keys = |r: &Roster| -> Keys {
            let unit = find_unit(r, unit_id)?;
            let mut keys = BTreeSet::from([EntityKey::Unit(unit_id)]);
            keys.extend(unit.assigned_call_id.map(EntityKey::Call));
            Ok(keys)
        };
        let plan = |r: &Roster| -> Planned<Unit> {
            let unit = find_unit(r, unit_id)?;
            let status = r
                .catalog()
                .get(status_id)
                .ok_or_else(|| MutationError::not_found("status", status_id))?;
            if !actor.can_manage(unit) {
                return Err(MutationError::Forbidden(
                    "only the unit's owner or dispatch may change its status".into(),
                ));
            }
            if unit.suspended {
                return Err(MutationError::Forbidden("unit is suspended".into()));
            }
            if status.department_id != unit.department_id {
                return Err(MutationError::Invalid(
                    "status belongs to another department".into(),
                ));
            }
            if unit.status_id == Some(status_id) {
                return Ok(Plan::Unchanged(unit.clone()));
            }

            let was_on = r.is_active(unit);
            if !was_on && status.should_do != ShouldDo::SetOnDuty {
                return Err(MutationError::Invalid(format!(
                    "unit {} is off duty; only the on-duty status can be selected",
                    unit.display_callsign()
                )));
            }

            let now = Utc::now();
            let now_on = status.should_do.is_on_roster();
            let mut next = unit.clone();
            next.status_id = Some(status_id);
            next.updated_at = now;

            let mut changes = Changeset::default();
            if !now_on {
                if let Some(call) = unit.assigned_call_id.and_then(|id| r.call(id)) {
                    changes.calls.push(detach(call, unit, "went off duty", now));
                }
                next.assigned_call_id = None;
            }
            changes
                .duty_logs
                .extend(duty_transition(r, unit_id, was_on, now_on, now));
            changes.units.push(next);
            Ok(Plan::Apply(changes))
        };

        self.run("set_unit_status", keys, plan)
            .await?
            .finish(|c| c.units.into_iter().find(|u| u.id == unit_id))
    }

    /// Register a new unit. It starts off the roster.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless the actor is an administrator, `Invalid` for a
    /// malformed payload, `Unavailable` on store failure.
    pub async fn register_unit(
        &self,
        payload: &UnitPayload,
        actor: Actor,
    ) -> Result<MutationOutcome<Unit>, MutationError> {
        require_admin(actor)?;
        payload.validate()?;

        let unit = Unit {
            id: UnitId::new(),
            kind: payload.kind,
            name: payload.name.trim().to_owned(),
            callsign: payload.callsign.trim().to_owned(),
            callsign2: payload.callsign2.trim().to_owned(),
            department_id: payload.department_id,
            division_id: payload.division_id,
            badge_number: payload.badge_number,
            status_id: None,
            assigned_call_id: None,
            suspended: payload.suspended,
            user_id: payload.user_id,
            updated_at: Utc::now(),
            revision: 0,
        };
        let unit_id = unit.id;

        self.run(
            "register_unit",
            |_| Ok(BTreeSet::from([EntityKey::Unit(unit_id)])),
            |_| {
                Ok(Plan::Apply(Changeset {
                    units: vec![unit],
                    ..Changeset::default()
                }))
            },
        )
        .await?
        .finish(|c| c.units.into_iter().find(|u| u.id == unit_id))
    }

    /// Delete a unit.
    ///
    /// Detaches it from its call, closes its duty log, and clears it as
    /// author on any BOLO it issued.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless the actor is an administrator, `NotFound` for an
    /// unknown unit, `Unavailable` on store failure.
    pub async fn delete_unit(
        &self,
        unit_id: UnitId,
        actor: Actor,
    ) -> Result<MutationOutcome<UnitId>, MutationError> {
        require_admin(actor)?;

        let keys = |r: &Roster| -> Keys {
            let unit = find_unit(r, unit_id)?;
            let mut keys = BTreeSet::from([EntityKey::Unit(unit_id)]);
            keys.extend(unit.assigned_call_id.map(EntityKey::Call));
            keys.extend(
                r.bolos()
                    .filter(|b| b.author_unit_id == Some(unit_id))
                    .map(|b| EntityKey::Bolo(b.id)),
            );
            Ok(keys)
        };
        let plan = |r: &Roster| -> Planned<UnitId> {
            let unit = find_unit(r, unit_id)?;
            let now = Utc::now();
            let mut changes = Changeset::default();

            if let Some(call) = unit.assigned_call_id.and_then(|id| r.call(id)) {
                changes.calls.push(detach(call, unit, "was removed", now));
            }
            if let Some(open) = r.open_duty_log(unit_id) {
                let mut closed = open.clone();
                closed.ended_at = Some(now);
                changes.duty_logs.push(closed);
            }
            for bolo in r.bolos().filter(|b| b.author_unit_id == Some(unit_id)) {
                let mut next = bolo.clone();
                next.author_unit_id = None;
                next.updated_at = now;
                changes.bolos.push(next);
            }
            changes.deleted_units.push(unit_id);
            Ok(Plan::Apply(changes))
        };

        self.run("delete_unit", keys, plan)
            .await?
            .finish(|_| Some(unit_id))
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Open a new call with no units assigned.
    ///
    /// Not idempotent: sending the same payload twice opens two calls.
    ///
    /// # Errors
    ///
    /// `Invalid` for a malformed payload, `Unavailable` on store failure.
    pub async fn create_call(
        &self,
        payload: &CallPayload,
        actor: Actor,
    ) -> Result<MutationOutcome<Call>, MutationError> {
        payload.validate()?;

        let now = Utc::now();
        let call = Call {
            id: CallId::new(),
            name: payload.name.trim().to_owned(),
            location: payload.location.trim().to_owned(),
            description: payload.description.trim().to_owned(),
            created_by: actor.user_id,
            created_at: now,
            updated_at: now,
            assigned_units: Vec::new(),
            events: Vec::new(),
            revision: 0,
        };
        let call_id = call.id;

        self.run(
            "create_call",
            |_| Ok(BTreeSet::from([EntityKey::Call(call_id)])),
            |_| {
                Ok(Plan::Apply(Changeset {
                    calls: vec![call],
                    ..Changeset::default()
                }))
            },
        )
        .await?
        .finish(|c| c.calls.into_iter().find(|x| x.id == call_id))
    }

    /// Edit a call and, when `assigned_units` is given, replace its
    /// assigned-unit set.
    ///
    /// Added units get their `assigned_call_id` set, removed units get it
    /// cleared, all in one transaction.
    ///
    /// # Errors
    ///
    /// `Forbidden` without dispatch authority, `Invalid` for a malformed
    /// payload, `NotFound` for an unknown call or listed unit, `Conflict`
    /// if an added unit is on another call or off the roster,
    /// `Unavailable` on store failure.
    pub async fn update_call(
        &self,
        call_id: CallId,
        payload: &CallPayload,
        actor: Actor,
    ) -> Result<MutationOutcome<Call>, MutationError> {
        require_dispatch(actor)?;
        payload.validate()?;

        let desired: Option<Vec<UnitId>> = payload.assigned_units.as_ref().map(|ids| {
            let mut seen = BTreeSet::new();
            ids.iter().copied().filter(|id| seen.insert(*id)).collect()
        });

        let keys = |r: &Roster| -> Keys {
            let call = find_call(r, call_id)?;
            let mut keys = BTreeSet::from([EntityKey::Call(call_id)]);
            keys.extend(call.unit_ids().map(EntityKey::Unit));
            if let Some(desired) = &desired {
                keys.extend(desired.iter().copied().map(EntityKey::Unit));
            }
            Ok(keys)
        };
        let plan = |r: &Roster| -> Planned<Call> {
            let call = find_call(r, call_id)?;
            let now = Utc::now();
            let mut next = call.clone();
            next.name = payload.name.trim().to_owned();
            next.location = payload.location.trim().to_owned();
            next.description = payload.description.trim().to_owned();
            let mut changes = Changeset::default();

            if let Some(desired) = &desired {
                for id in desired {
                    find_unit(r, *id)?;
                }
                let current: BTreeSet<UnitId> = call.unit_ids().collect();
                let wanted: BTreeSet<UnitId> = desired.iter().copied().collect();

                for unit_id in desired.iter().filter(|id| !current.contains(id)) {
                    let unit = find_unit(r, *unit_id)?;
                    check_assignable(r, unit, call_id)?;
                    attach(&mut next, unit, now);
                    let mut moved = unit.clone();
                    moved.assigned_call_id = Some(call_id);
                    moved.updated_at = now;
                    changes.units.push(moved);
                }
                for unit_id in current.difference(&wanted) {
                    let Some(unit) = r.unit(*unit_id) else {
                        continue;
                    };
                    next = detach(&next, unit, "was unassigned", now);
                    let mut freed = unit.clone();
                    freed.assigned_call_id = None;
                    freed.updated_at = now;
                    changes.units.push(freed);
                }
            }

            let fields_same = next.name == call.name
                && next.location == call.location
                && next.description == call.description;
            if fields_same && changes.units.is_empty() {
                return Ok(Plan::Unchanged(call.clone()));
            }
            next.updated_at = now;
            changes.calls.push(next);
            Ok(Plan::Apply(changes))
        };

        self.run("update_call", keys, plan)
            .await?
            .finish(|c| c.calls.into_iter().find(|x| x.id == call_id))
    }

    /// End (delete) a call, clearing `assigned_call_id` on every unit that
    /// was on it.
    ///
    /// The unit updates are published before the call delete.
    ///
    /// # Errors
    ///
    /// `Forbidden` without dispatch authority, `NotFound` if the call is
    /// already gone, `Unavailable` on store failure.
    pub async fn end_call(
        &self,
        call_id: CallId,
        actor: Actor,
    ) -> Result<MutationOutcome<CallId>, MutationError> {
        require_dispatch(actor)?;

        let keys = |r: &Roster| -> Keys {
            let call = find_call(r, call_id)?;
            let mut keys = BTreeSet::from([EntityKey::Call(call_id)]);
            keys.extend(call.unit_ids().map(EntityKey::Unit));
            Ok(keys)
        };
        let plan = |r: &Roster| -> Planned<CallId> {
            let call = find_call(r, call_id)?;
            let now = Utc::now();
            let mut changes = Changeset::default();
            for unit in call.unit_ids().filter_map(|id| r.unit(id)) {
                if unit.assigned_call_id == Some(call_id) {
                    let mut freed = unit.clone();
                    freed.assigned_call_id = None;
                    freed.updated_at = now;
                    changes.units.push(freed);
                }
            }
            changes.deleted_calls.push(call_id);
            Ok(Plan::Apply(changes))
        };

        self.run("end_call", keys, plan)
            .await?
            .finish(|_| Some(call_id))
    }

    /// Assign one unit to a call.
    ///
    /// Assigning a unit to the call it is already on changes nothing.
    ///
    /// # Errors
    ///
    /// `Forbidden` without dispatch authority, `NotFound` for an unknown
    /// call or unit, `Conflict` if the unit is on another call (unassign it
    /// first) or off the roster, `Unavailable` on store failure.
    pub async fn assign_unit(
        &self,
        call_id: CallId,
        unit_id: UnitId,
        actor: Actor,
    ) -> Result<MutationOutcome<Call>, MutationError> {
        require_dispatch(actor)?;

        let keys = |r: &Roster| -> Keys {
            find_call(r, call_id)?;
            let unit = find_unit(r, unit_id)?;
            let mut keys = BTreeSet::from([EntityKey::Call(call_id), EntityKey::Unit(unit_id)]);
            keys.extend(unit.assigned_call_id.map(EntityKey::Call));
            Ok(keys)
        };
        let plan = |r: &Roster| -> Planned<Call> {
            let call = find_call(r, call_id)?;
            let unit = find_unit(r, unit_id)?;
            if unit.assigned_call_id == Some(call_id) && call.has_unit(unit_id) {
                return Ok(Plan::Unchanged(call.clone()));
            }
            check_assignable(r, unit, call_id)?;

            let now = Utc::now();
            let mut next = call.clone();
            attach(&mut next, unit, now);
            next.updated_at = now;
            let mut moved = unit.clone();
            moved.assigned_call_id = Some(call_id);
            moved.updated_at = now;
            Ok(Plan::Apply(Changeset {
                calls: vec![next],
                units: vec![moved],
                ..Changeset::default()
            }))
        };

        self.run("assign_unit", keys, plan)
            .await?
            .finish(|c| c.calls.into_iter().find(|x| x.id == call_id))
    }

    /// Remove one unit from a call.
    ///
    /// # Errors
    ///
    /// `Forbidden` without dispatch authority, `NotFound` for an unknown
    /// call or unit or if the unit is not on that call, `Unavailable` on
    /// store failure.
    pub async fn unassign_unit(
        &self,
        call_id: CallId,
        unit_id: UnitId,
        actor: Actor,
    ) -> Result<MutationOutcome<Call>, MutationError> {
        require_dispatch(actor)?;

        let keys = |r: &Roster| -> Keys {
            find_call(r, call_id)?;
            find_unit(r, unit_id)?;
            Ok(BTreeSet::from([
                EntityKey::Call(call_id),
                EntityKey::Unit(unit_id),
            ]))
        };
        let plan = |r: &Roster| -> Planned<Call> {
            let call = find_call(r, call_id)?;
            let unit = find_unit(r, unit_id)?;
            if !call.has_unit(unit_id) {
                return Err(MutationError::not_found("assignment", unit_id));
            }
            let now = Utc::now();
            let mut next = detach(call, unit, "was unassigned", now);
            next.updated_at = now;
            let mut freed = unit.clone();
            freed.assigned_call_id = None;
            freed.updated_at = now;
            Ok(Plan::Apply(Changeset {
                calls: vec![next],
                units: vec![freed],
                ..Changeset::default()
            }))
        };

        self.run("unassign_unit", keys, plan)
            .await?
            .finish(|c| c.calls.into_iter().find(|x| x.id == call_id))
    }

    // -----------------------------------------------------------------------
    // Call notes
    // -----------------------------------------------------------------------

    /// Append a note to a call.
    ///
    /// # Errors
    ///
    /// `Forbidden` without dispatch authority, `Invalid` for a malformed
    /// payload, `NotFound` for an unknown call, `Unavailable` on store
    /// failure.
    pub async fn add_call_event(
        &self,
        call_id: CallId,
        payload: &CallEventPayload,
        actor: Actor,
    ) -> Result<MutationOutcome<Call>, MutationError> {
        require_dispatch(actor)?;
        payload.validate()?;

        self.edit_call("add_call_event", call_id, |call, now| {
            call.events.push(note(payload.description.trim().to_owned(), now));
            Ok(true)
        })
        .await
    }

    /// Rewrite an existing call note.
    ///
    /// # Errors
    ///
    /// As [`Self::add_call_event`], plus `NotFound` for an unknown note.
    pub async fn update_call_event(
        &self,
        call_id: CallId,
        event_id: CallEventId,
        payload: &CallEventPayload,
        actor: Actor,
    ) -> Result<MutationOutcome<Call>, MutationError> {
        require_dispatch(actor)?;
        payload.validate()?;

        self.edit_call("update_call_event", call_id, |call, _| {
            let event = call
                .events
                .iter_mut()
                .find(|e| e.id == event_id)
                .ok_or_else(|| MutationError::not_found("call event", event_id))?;
            let text = payload.description.trim();
            if event.description == text {
                return Ok(false);
            }
            text.clone_into(&mut event.description);
            Ok(true)
        })
        .await
    }

    /// Remove a call note.
    ///
    /// # Errors
    ///
    /// `Forbidden` without dispatch authority, `NotFound` for an unknown
    /// call or note, `Unavailable` on store failure.
    pub async fn delete_call_event(
        &self,
        call_id: CallId,
        event_id: CallEventId,
        actor: Actor,
    ) -> Result<MutationOutcome<Call>, MutationError> {
        require_dispatch(actor)?;

        self.edit_call("delete_call_event", call_id, |call, _| {
            let before = call.events.len();
            call.events.retain(|e| e.id != event_id);
            if call.events.len() == before {
                return Err(MutationError::not_found("call event", event_id));
            }
            Ok(true)
        })
        .await
    }

    /// Single-call edit that touches nothing else. `edit` returns whether
    /// it changed the call.
    async fn edit_call<F>(
        &self,
        op: &'static str,
        call_id: CallId,
        edit: F,
    ) -> Result<MutationOutcome<Call>, MutationError>
    where
        F: FnOnce(&mut Call, DateTime<Utc>) -> Result<bool, MutationError> + Send,
    {
        let keys = |r: &Roster| -> Keys {
            find_call(r, call_id)?;
            Ok(BTreeSet::from([EntityKey::Call(call_id)]))
        };
        let plan = |r: &Roster| -> Planned<Call> {
            let call = find_call(r, call_id)?;
            let now = Utc::now();
            let mut next = call.clone();
            if !edit(&mut next, now)? {
                return Ok(Plan::Unchanged(call.clone()));
            }
            next.updated_at = now;
            Ok(Plan::Apply(Changeset {
                calls: vec![next],
                ..Changeset::default()
            }))
        };

        self.run(op, keys, plan)
            .await?
            .finish(|c| c.calls.into_iter().find(|x| x.id == call_id))
    }

    // -----------------------------------------------------------------------
    // BOLOs
    // -----------------------------------------------------------------------

    /// Issue a BOLO.
    ///
    /// Not idempotent: sending the same payload twice issues two BOLOs.
    ///
    /// # Errors
    ///
    /// `Invalid` for a malformed payload, `NotFound` for an unknown author
    /// unit, `Forbidden` if a non-dispatcher names a unit they do not own,
    /// `Unavailable` on store failure.
    pub async fn create_bolo(
        &self,
        payload: &BoloPayload,
        actor: Actor,
    ) -> Result<MutationOutcome<Bolo>, MutationError> {
        payload.validate()?;

        let now = Utc::now();
        let bolo = Bolo {
            id: BoloId::new(),
            bolo_type: payload.bolo_type,
            description: payload.description.trim().to_owned(),
            name: optional_text(payload.name.as_deref()),
            plate: optional_text(payload.plate.as_deref()),
            color: optional_text(payload.color.as_deref()),
            author_unit_id: payload.author_unit_id,
            created_at: now,
            updated_at: now,
            revision: 0,
        };
        let bolo_id = bolo.id;

        let keys = |_: &Roster| -> Keys {
            let mut keys = BTreeSet::from([EntityKey::Bolo(bolo_id)]);
            keys.extend(payload.author_unit_id.map(EntityKey::Unit));
            Ok(keys)
        };
        let plan = |r: &Roster| -> Planned<Bolo> {
            check_author(r, payload.author_unit_id, actor)?;
            Ok(Plan::Apply(Changeset {
                bolos: vec![bolo],
                ..Changeset::default()
            }))
        };

        self.run("create_bolo", keys, plan)
            .await?
            .finish(|c| c.bolos.into_iter().find(|b| b.id == bolo_id))
    }

    /// Edit a BOLO.
    ///
    /// # Errors
    ///
    /// `Invalid` for a malformed payload, `NotFound` for an unknown BOLO
    /// or author unit, `Forbidden` unless the actor dispatches or owns the
    /// author unit, `Unavailable` on store failure.
    pub async fn update_bolo(
        &self,
        bolo_id: BoloId,
        payload: &BoloPayload,
        actor: Actor,
    ) -> Result<MutationOutcome<Bolo>, MutationError> {
        payload.validate()?;

        let keys = |r: &Roster| -> Keys {
            let bolo = find_bolo(r, bolo_id)?;
            let mut keys = BTreeSet::from([EntityKey::Bolo(bolo_id)]);
            keys.extend(bolo.author_unit_id.map(EntityKey::Unit));
            keys.extend(payload.author_unit_id.map(EntityKey::Unit));
            Ok(keys)
        };
        let plan = |r: &Roster| -> Planned<Bolo> {
            let bolo = find_bolo(r, bolo_id)?;
            check_bolo_editor(r, bolo, actor)?;
            if payload.author_unit_id != bolo.author_unit_id {
                check_author(r, payload.author_unit_id, actor)?;
            }

            let mut next = bolo.clone();
            next.bolo_type = payload.bolo_type;
            payload.description.trim().clone_into(&mut next.description);
            next.name = optional_text(payload.name.as_deref());
            next.plate = optional_text(payload.plate.as_deref());
            next.color = optional_text(payload.color.as_deref());
            next.author_unit_id = payload.author_unit_id;
            if &next == bolo {
                return Ok(Plan::Unchanged(bolo.clone()));
            }
            next.updated_at = Utc::now();
            Ok(Plan::Apply(Changeset {
                bolos: vec![next],
                ..Changeset::default()
            }))
        };

        self.run("update_bolo", keys, plan)
            .await?
            .finish(|c| c.bolos.into_iter().find(|b| b.id == bolo_id))
    }

    /// Withdraw a BOLO.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown BOLO, `Forbidden` unless the actor
    /// dispatches or owns the author unit, `Unavailable` on store failure.
    pub async fn delete_bolo(
        &self,
        bolo_id: BoloId,
        actor: Actor,
    ) -> Result<MutationOutcome<BoloId>, MutationError> {
        let keys = |r: &Roster| -> Keys {
            let bolo = find_bolo(r, bolo_id)?;
            let mut keys = BTreeSet::from([EntityKey::Bolo(bolo_id)]);
            keys.extend(bolo.author_unit_id.map(EntityKey::Unit));
            Ok(keys)
        };
        let plan = |r: &Roster| -> Planned<BoloId> {
            let bolo = find_bolo(r, bolo_id)?;
            check_bolo_editor(r, bolo, actor)?;
            Ok(Plan::Apply(Changeset {
                deleted_bolos: vec![bolo_id],
                ..Changeset::default()
            }))
        };

        self.run("delete_bolo", keys, plan)
            .await?
            .finish(|_| Some(bolo_id))
    }

    // -----------------------------------------------------------------------
    // Status catalog
    // -----------------------------------------------------------------------

    /// Swap in a new status catalog and tell sessions which departments
    /// changed.
    ///
    /// Waits for in-flight mutations to finish and holds new ones back
    /// until the swap is done.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless the actor is an administrator, `Invalid` if the
    /// catalog breaks the on-duty rule or would leave a unit holding a
    /// status that no longer exists (or an assigned unit off the roster).
    pub async fn reload_catalog(
        &self,
        values: Vec<StatusValue>,
        actor: Actor,
    ) -> Result<Vec<DepartmentId>, MutationError> {
        require_admin(actor)?;
        let catalog =
            StatusCatalog::new(values).map_err(|e| MutationError::Invalid(e.to_string()))?;

        let _gate = self.inner.catalog_gate.write().await;
        let mut roster = self.inner.roster.write().await;

        for unit in roster.units() {
            if let Some(status_id) = unit.status_id {
                let kept = catalog
                    .get(status_id)
                    .is_some_and(|s| s.department_id == unit.department_id);
                if !kept {
                    return Err(MutationError::Invalid(format!(
                        "unit {} holds status {status_id}, which the new catalog drops",
                        unit.display_callsign()
                    )));
                }
            }
            if unit.assigned_call_id.is_some() && !catalog.is_on_roster(unit.status_id) {
                return Err(MutationError::Invalid(format!(
                    "unit {} is assigned but its status would be off-roster",
                    unit.display_callsign()
                )));
            }
        }

        let changed: Vec<DepartmentId> = roster
            .catalog()
            .changed_departments(&catalog)
            .into_iter()
            .collect();
        roster.replace_catalog(catalog);
        for department in &changed {
            self.inner.broadcaster.publish_catalog_invalidated(*department);
        }
        drop(roster);

        tracing::info!(departments = changed.len(), "Status catalog reloaded");
        Ok(changed)
    }

    /// Re-read statuses from the store and swap them in.
    ///
    /// # Errors
    ///
    /// As [`Self::reload_catalog`], plus `Unavailable` if the store cannot
    /// be read in time.
    pub async fn reload_catalog_from_store(
        &self,
        actor: Actor,
    ) -> Result<Vec<DepartmentId>, MutationError> {
        require_admin(actor)?;
        let values = tokio::time::timeout(
            self.inner.persist_timeout,
            self.inner.store.load_statuses(),
        )
        .await
        .map_err(|e| MutationError::Unavailable(format!("status load timed out: {e}")))??;
        self.reload_catalog(values, actor).await
    }
}

impl Inner {
    async fn persist_and_commit(
        &self,
        op: &'static str,
        changes: Changeset,
    ) -> Result<(Changeset, Vec<SyncEvent>), MutationError> {
        // Only the work before COMMIT is bounded.
        if let Err(e) = self
            .store
            .apply_within(&changes, self.persist_timeout)
            .await
        {
            tracing::warn!(op, error = %e, "Store rejected mutation");
            return Err(e.into());
        }

        let mut roster = self.roster.write().await;
        let (committed, events) = roster.commit(changes);
        // Publishing under the write lock keeps broadcast order identical
        // to revision order.
        self.broadcaster.publish_events(&events);
        let revision = roster.revision();
        drop(roster);

        tracing::info!(op, revision, events = events.len(), "Mutation committed");
        Ok((committed, events))
    }
}

// ---------------------------------------------------------------------------
// Planning helpers
// ---------------------------------------------------------------------------

fn require_dispatch(actor: Actor) -> Result<(), MutationError> {
    if actor.dispatch {
        Ok(())
    } else {
        Err(MutationError::Forbidden("dispatch authority required".into()))
    }
}

fn require_admin(actor: Actor) -> Result<(), MutationError> {
    if actor.admin {
        Ok(())
    } else {
        Err(MutationError::Forbidden(
            "administrative authority required".into(),
        ))
    }
}

fn find_unit(roster: &Roster, id: UnitId) -> Result<&Unit, MutationError> {
    roster
        .unit(id)
        .ok_or_else(|| MutationError::not_found("unit", id))
}

fn find_call(roster: &Roster, id: CallId) -> Result<&Call, MutationError> {
    roster
        .call(id)
        .ok_or_else(|| MutationError::not_found("call", id))
}

fn find_bolo(roster: &Roster, id: BoloId) -> Result<&Bolo, MutationError> {
    roster
        .bolo(id)
        .ok_or_else(|| MutationError::not_found("bolo", id))
}

/// A unit may join `call_id` only if it is on the roster and not on
/// another call.
fn check_assignable(roster: &Roster, unit: &Unit, call_id: CallId) -> Result<(), MutationError> {
    if let Some(other) = unit.assigned_call_id.filter(|other| *other != call_id) {
        return Err(MutationError::Conflict(format!(
            "unit {} is assigned to call {other}; unassign it first",
            unit.display_callsign()
        )));
    }
    if !roster.is_active(unit) {
        return Err(MutationError::Conflict(format!(
            "unit {} is not on the roster",
            unit.display_callsign()
        )));
    }
    Ok(())
}

/// An author unit must exist, and non-dispatchers may only name their own.
fn check_author(
    roster: &Roster,
    author: Option<UnitId>,
    actor: Actor,
) -> Result<(), MutationError> {
    let Some(author) = author else {
        return Ok(());
    };
    let unit = find_unit(roster, author)?;
    if !actor.dispatch && !actor.owns(unit) {
        return Err(MutationError::Forbidden(
            "author unit belongs to another user".into(),
        ));
    }
    Ok(())
}

fn check_bolo_editor(roster: &Roster, bolo: &Bolo, actor: Actor) -> Result<(), MutationError> {
    let owns_author = bolo
        .author_unit_id
        .and_then(|id| roster.unit(id))
        .is_some_and(|unit| actor.owns(unit));
    if actor.dispatch || owns_author {
        Ok(())
    } else {
        Err(MutationError::Forbidden(
            "only dispatch or the issuing unit may change this bolo".into(),
        ))
    }
}

fn note(description: String, now: DateTime<Utc>) -> CallEvent {
    CallEvent {
        id: CallEventId::new(),
        created_at: now,
        description,
    }
}

/// Link `unit` into `call` and record it in the notes.
fn attach(call: &mut Call, unit: &Unit, now: DateTime<Utc>) {
    call.assigned_units.push(AssignedUnit {
        unit_id: unit.id,
        kind: unit.kind,
        assigned_at: now,
    });
    call.events.push(note(
        format!("Unit {} was assigned", unit.display_callsign()),
        now,
    ));
}

/// A copy of `call` without `unit`, with the removal recorded in the notes.
fn detach(call: &Call, unit: &Unit, reason: &str, now: DateTime<Utc>) -> Call {
    let mut next = call.clone();
    next.assigned_units.retain(|a| a.unit_id != unit.id);
    next.events.push(note(
        format!("Unit {} {reason}", unit.display_callsign()),
        now,
    ));
    next.updated_at = now;
    next
}

/// Open or close a duty log when a unit crosses the roster boundary.
fn duty_transition(
    roster: &Roster,
    unit_id: UnitId,
    was_on: bool,
    now_on: bool,
    now: DateTime<Utc>,
) -> Option<DutyLog> {
    match (was_on, now_on) {
        (false, true) => Some(DutyLog {
            id: DutyLogId::new(),
            unit_id,
            started_at: now,
            ended_at: None,
        }),
        (true, false) => roster.open_duty_log(unit_id).map(|open| {
            let mut closed = open.clone();
            closed.ended_at = Some(now);
            closed
        }),
        _ => None,
    }
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
