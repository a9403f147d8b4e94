//! Client-side reconciliation cache.
//!
//! A [`ClientMirror`] is what a console or field client keeps locally: the
//! units, open calls, and active BOLOs keyed by id, plus the status catalog.
//! Events are whole snapshots, merged by id. Each entity remembers the last
//! revision it saw (deleted entities keep a tombstone revision), and an
//! event at or below that revision is dropped. That makes duplicate or
//! late delivery harmless.
//!
//! The installed snapshot's revision is a floor for every later event:
//! anything at or below it is already part of the snapshot, whether it
//! was queued during the resync or was still in flight on the
//! subscription when the snapshot landed.
//!
//! The mirror also watches broadcast sequence numbers. A hole means an
//! event was missed; the mirror drops its state and waits for a snapshot,
//! queueing whatever arrives in the meantime and replaying only the part
//! of the queue the snapshot does not already reflect.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use dispatch_types::{
    Bolo, BoloId, Broadcast, BroadcastBody, Call, CallId, ChangeKind, DepartmentId, EntityKind,
    EntityPayload, RosterSnapshot, StatusValue, SyncEvent, Unit, UnitId,
};
use uuid::Uuid;

/// What happened to one incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The message changed the mirror.
    Applied,
    /// The message was already reflected (stale revision or repeated seq).
    Ignored,
    /// The mirror is resyncing; the message was queued for replay.
    Queued,
    /// A sequence hole was found. State was discarded and the mirror now
    /// needs a snapshot.
    GapDetected,
}

#[derive(Debug, Clone)]
enum Phase {
    Resyncing { queue: Vec<Broadcast> },
    Live,
}

/// Local replica of the roster maintained from broadcasts and snapshots.
#[derive(Debug, Clone)]
pub struct ClientMirror {
    units: BTreeMap<UnitId, Unit>,
    calls: BTreeMap<CallId, Call>,
    bolos: BTreeMap<BoloId, Bolo>,
    statuses: BTreeMap<DepartmentId, Vec<StatusValue>>,
    known: HashMap<(EntityKind, Uuid), u64>,
    stale_catalogs: BTreeSet<DepartmentId>,
    phase: Phase,
    last_seq: u64,
    watermark: u64,
    revision: u64,
}

impl Default for ClientMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientMirror {
    /// An empty mirror waiting for its first snapshot.
    pub fn new() -> Self {
        Self {
            units: BTreeMap::new(),
            calls: BTreeMap::new(),
            bolos: BTreeMap::new(),
            statuses: BTreeMap::new(),
            known: HashMap::new(),
            stale_catalogs: BTreeSet::new(),
            phase: Phase::Resyncing { queue: Vec::new() },
            last_seq: 0,
            watermark: 0,
            revision: 0,
        }
    }

    /// Discard everything and wait for a snapshot.
    ///
    /// `next_seq` is the first broadcast sequence number the caller's
    /// subscription will deliver.
    pub fn begin_resync(&mut self, next_seq: u64) {
        self.clear();
        self.phase = Phase::Resyncing { queue: Vec::new() };
        self.last_seq = next_seq.saturating_sub(1);
    }

    fn clear(&mut self) {
        self.units.clear();
        self.calls.clear();
        self.bolos.clear();
        self.statuses.clear();
        self.known.clear();
        self.stale_catalogs.clear();
        self.watermark = 0;
        self.revision = 0;
    }

    /// Feed one broadcast.
    pub fn receive(&mut self, message: Broadcast) -> ApplyOutcome {
        let expected = self.last_seq.saturating_add(1);
        if message.seq < expected {
            return ApplyOutcome::Ignored;
        }
        if message.seq > expected {
            tracing::debug!(
                expected,
                got = message.seq,
                "Broadcast sequence gap, resyncing"
            );
            self.clear();
            self.last_seq = message.seq;
            self.phase = Phase::Resyncing {
                queue: vec![message],
            };
            return ApplyOutcome::GapDetected;
        }
        self.last_seq = message.seq;

        match &mut self.phase {
            Phase::Resyncing { queue } => {
                queue.push(message);
                ApplyOutcome::Queued
            }
            Phase::Live => {
                if self.apply_body(&message.body) {
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::Ignored
                }
            }
        }
    }

    /// Install a snapshot and replay the queue on top of it.
    ///
    /// Queued events already reflected in the snapshot are dropped.
    pub fn apply_snapshot(&mut self, snapshot: RosterSnapshot) {
        let queue = match std::mem::replace(&mut self.phase, Phase::Live) {
            Phase::Resyncing { queue } => queue,
            Phase::Live => Vec::new(),
        };

        self.clear();
        self.watermark = snapshot.revision;
        self.revision = snapshot.revision;
        for unit in snapshot.units.values() {
            self.known
                .insert((EntityKind::Unit, unit.id.into_inner()), unit.revision);
        }
        for call in snapshot.calls.values() {
            self.known
                .insert((EntityKind::Call, call.id.into_inner()), call.revision);
        }
        for bolo in snapshot.bolos.values() {
            self.known
                .insert((EntityKind::Bolo, bolo.id.into_inner()), bolo.revision);
        }
        self.units = snapshot.units;
        self.calls = snapshot.calls;
        self.bolos = snapshot.bolos;
        for status in snapshot.statuses {
            self.statuses
                .entry(status.department_id)
                .or_default()
                .push(status);
        }
        for list in self.statuses.values_mut() {
            list.sort_by_key(|s| s.position);
        }

        let mut replayed = 0_usize;
        for message in &queue {
            if self.apply_body(&message.body) {
                replayed = replayed.saturating_add(1);
            }
        }

        tracing::debug!(
            revision = self.watermark,
            queued = queue.len(),
            replayed,
            "Mirror resynced"
        );
    }

    fn apply_body(&mut self, body: &BroadcastBody) -> bool {
        match body {
            BroadcastBody::Event(event) => self.apply_event(event),
            BroadcastBody::CatalogInvalidated(department) => {
                self.stale_catalogs.insert(*department)
            }
        }
    }

    /// Merge one entity event. Returns whether it changed anything.
    ///
    /// Events at or below the snapshot watermark are dropped, as are events
    /// at or below the entity's last seen revision.
    pub fn apply_event(&mut self, event: &SyncEvent) -> bool {
        if event.revision <= self.watermark {
            return false;
        }
        let key = event.key();
        if self.known.get(&key).is_some_and(|seen| event.revision <= *seen) {
            return false;
        }
        self.known.insert(key, event.revision);
        self.revision = self.revision.max(event.revision);

        match (event.change_kind, &event.entity) {
            (ChangeKind::Upsert, EntityPayload::Unit(unit)) => {
                self.units.insert(unit.id, (**unit).clone());
            }
            (ChangeKind::Upsert, EntityPayload::Call(call)) => {
                self.calls.insert(call.id, (**call).clone());
            }
            (ChangeKind::Upsert, EntityPayload::Bolo(bolo)) => {
                self.bolos.insert(bolo.id, (**bolo).clone());
            }
            (_, payload) => {
                let id = match payload {
                    EntityPayload::Unit(u) => u.id.into_inner(),
                    EntityPayload::Call(c) => c.id.into_inner(),
                    EntityPayload::Bolo(b) => b.id.into_inner(),
                    EntityPayload::Removed(r) => r.id,
                };
                match event.entity_kind {
                    EntityKind::Unit => {
                        self.units.remove(&UnitId::from(id));
                    }
                    EntityKind::Call => {
                        self.calls.remove(&CallId::from(id));
                    }
                    EntityKind::Bolo => {
                        self.bolos.remove(&BoloId::from(id));
                    }
                }
            }
        }
        true
    }

    /// Replace one department's statuses after a re-fetch.
    pub fn set_statuses(&mut self, department: DepartmentId, statuses: Vec<StatusValue>) {
        self.stale_catalogs.remove(&department);
        if statuses.is_empty() {
            self.statuses.remove(&department);
        } else {
            self.statuses.insert(department, statuses);
        }
    }

    /// Departments whose catalog was invalidated and not yet re-fetched.
    pub const fn stale_catalogs(&self) -> &BTreeSet<DepartmentId> {
        &self.stale_catalogs
    }

    /// Whether the mirror is live (not waiting for a snapshot).
    pub const fn is_live(&self) -> bool {
        matches!(self.phase, Phase::Live)
    }

    /// Revision of the last installed snapshot.
    pub const fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Highest revision reflected in the mirror, from the snapshot or any
    /// event applied since.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Sequence number of the last broadcast seen.
    pub const fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Mirrored units.
    pub const fn units(&self) -> &BTreeMap<UnitId, Unit> {
        &self.units
    }

    /// Mirrored open calls.
    pub const fn calls(&self) -> &BTreeMap<CallId, Call> {
        &self.calls
    }

    /// Mirrored active BOLOs.
    pub const fn bolos(&self) -> &BTreeMap<BoloId, Bolo> {
        &self.bolos
    }

    /// A mirrored unit.
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// A mirrored call.
    pub fn call(&self, id: CallId) -> Option<&Call> {
        self.calls.get(&id)
    }

    /// One department's mirrored statuses.
    pub fn statuses(&self, department: DepartmentId) -> &[StatusValue] {
        self.statuses.get(&department).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::Utc;
    use dispatch_types::{DivisionId, UnitKind, UserId};

    use super::*;

    fn unit(revision: u64) -> Unit {
        Unit {
            id: UnitId::new(),
            kind: UnitKind::Leo,
            name: "Mirror".into(),
            callsign: "3".into(),
            callsign2: "C".into(),
            department_id: DepartmentId::new(),
            division_id: DivisionId::new(),
            badge_number: None,
            status_id: None,
            assigned_call_id: None,
            suspended: false,
            user_id: UserId::new(),
            updated_at: Utc::now(),
            revision,
        }
    }

    fn live() -> ClientMirror {
        let mut mirror = ClientMirror::new();
        mirror.begin_resync(1);
        mirror.apply_snapshot(RosterSnapshot::default());
        mirror
    }

    fn msg(seq: u64, event: SyncEvent) -> Broadcast {
        Broadcast {
            seq,
            body: BroadcastBody::Event(event),
        }
    }

    #[test]
    fn duplicate_upsert_is_idempotent() {
        let mut mirror = live();
        let u = unit(3);
        let event = SyncEvent::unit_upsert(&u);

        assert!(mirror.apply_event(&event));
        let once = mirror.units().clone();
        assert!(!mirror.apply_event(&event));
        assert_eq!(mirror.units(), &once);
    }

    #[test]
    fn older_revision_does_not_overwrite_newer() {
        let mut mirror = live();
        let mut newer = unit(5);
        newer.name = "Newer".into();
        let mut older = newer.clone();
        older.revision = 4;
        older.name = "Older".into();

        mirror.apply_event(&SyncEvent::unit_upsert(&newer));
        assert!(!mirror.apply_event(&SyncEvent::unit_upsert(&older)));
        assert_eq!(mirror.unit(newer.id).unwrap().name, "Newer");
    }

    #[test]
    fn tombstone_blocks_stale_resurrection() {
        let mut mirror = live();
        let u = unit(2);
        mirror.apply_event(&SyncEvent::unit_upsert(&u));
        mirror.apply_event(&SyncEvent::unit_deleted(u.id, 3));
        assert!(mirror.unit(u.id).is_none());

        assert!(!mirror.apply_event(&SyncEvent::unit_upsert(&u)));
        assert!(mirror.unit(u.id).is_none());
    }

    #[test]
    fn sequence_gap_forces_resync() {
        let mut mirror = live();
        let a = unit(1);
        let b = unit(3);
        assert_eq!(
            mirror.receive(msg(1, SyncEvent::unit_upsert(&a))),
            ApplyOutcome::Applied
        );
        assert_eq!(
            mirror.receive(msg(3, SyncEvent::unit_upsert(&b))),
            ApplyOutcome::GapDetected
        );
        assert!(!mirror.is_live());
        assert!(mirror.units().is_empty());
    }

    #[test]
    fn repeated_seq_is_ignored() {
        let mut mirror = live();
        let a = unit(1);
        mirror.receive(msg(1, SyncEvent::unit_upsert(&a)));
        assert_eq!(
            mirror.receive(msg(1, SyncEvent::unit_upsert(&a))),
            ApplyOutcome::Ignored
        );
    }

    #[test]
    fn replay_drops_events_already_in_snapshot() {
        let mut mirror = ClientMirror::new();
        mirror.begin_resync(10);

        let mut in_snapshot = unit(7);
        in_snapshot.name = "From snapshot".into();
        let mut stale = in_snapshot.clone();
        stale.name = "Stale queued".into();
        let mut fresh = in_snapshot.clone();
        fresh.revision = 8;
        fresh.name = "Fresh queued".into();
        let other = unit(6);

        assert_eq!(
            mirror.receive(msg(10, SyncEvent::unit_upsert(&stale))),
            ApplyOutcome::Queued
        );
        mirror.receive(msg(11, SyncEvent::unit_upsert(&other)));
        mirror.receive(msg(12, SyncEvent::unit_upsert(&fresh)));

        let snapshot = RosterSnapshot {
            revision: 7,
            units: BTreeMap::from([(in_snapshot.id, in_snapshot.clone())]),
            ..RosterSnapshot::default()
        };
        mirror.apply_snapshot(snapshot);

        assert!(mirror.is_live());
        assert_eq!(mirror.unit(in_snapshot.id).unwrap().name, "Fresh queued");
        // Revision 6 <= watermark 7: reflected by the snapshot already.
        assert!(mirror.unit(other.id).is_none());
        assert_eq!(mirror.last_seq(), 12);
    }

    #[test]
    fn in_flight_events_below_the_watermark_are_dropped_after_going_live() {
        let mut mirror = ClientMirror::new();
        mirror.begin_resync(1);
        // Snapshot taken after the unit was created and deleted again.
        mirror.apply_snapshot(RosterSnapshot {
            revision: 2,
            ..RosterSnapshot::default()
        });
        assert!(mirror.is_live());

        let gone = unit(1);
        assert_eq!(
            mirror.receive(msg(1, SyncEvent::unit_upsert(&gone))),
            ApplyOutcome::Ignored
        );
        assert_eq!(
            mirror.receive(msg(2, SyncEvent::unit_deleted(gone.id, 2))),
            ApplyOutcome::Ignored
        );
        assert!(mirror.units().is_empty());
        assert_eq!(mirror.revision(), 2);

        let fresh = unit(3);
        assert_eq!(
            mirror.receive(msg(3, SyncEvent::unit_upsert(&fresh))),
            ApplyOutcome::Applied
        );
        assert_eq!(mirror.revision(), 3);
        assert_eq!(mirror.watermark(), 2);
    }

    #[test]
    fn catalog_invalidation_marks_department_stale() {
        let mut mirror = live();
        let dept = DepartmentId::new();
        let outcome = mirror.receive(Broadcast {
            seq: 1,
            body: BroadcastBody::CatalogInvalidated(dept),
        });
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert!(mirror.stale_catalogs().contains(&dept));

        mirror.set_statuses(dept, Vec::new());
        assert!(mirror.stale_catalogs().is_empty());
    }
}
