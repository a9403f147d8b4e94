//! The unit of work exchanged between the mutation layer and a store.
//!
//! A [`Changeset`] holds the full post-mutation rows of every entity one
//! mutation touched. Stores apply it in a single transaction: either every
//! row lands or none does. [`RosterData`] is the shape a store hands back
//! when the engine starts.

use dispatch_types::{Bolo, BoloId, Call, CallId, DutyLog, StatusValue, Unit, UnitId};

/// Everything one mutation wants written.
///
/// Calls are written whole: their assigned-unit links and notes replace
/// whatever the store held before.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    /// Calls to insert or replace.
    pub calls: Vec<Call>,
    /// Units to insert or replace.
    pub units: Vec<Unit>,
    /// Units to remove.
    pub deleted_units: Vec<UnitId>,
    /// Calls to remove, together with their links and notes.
    pub deleted_calls: Vec<CallId>,
    /// BOLOs to insert or replace.
    pub bolos: Vec<Bolo>,
    /// BOLOs to remove.
    pub deleted_bolos: Vec<BoloId>,
    /// Duty logs to insert or replace (opening or closing a period).
    pub duty_logs: Vec<DutyLog>,
}

impl Changeset {
    /// Whether applying this changeset would change nothing.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
            && self.units.is_empty()
            && self.deleted_units.is_empty()
            && self.deleted_calls.is_empty()
            && self.bolos.is_empty()
            && self.deleted_bolos.is_empty()
            && self.duty_logs.is_empty()
    }

    /// Total number of rows touched, for logging.
    pub fn len(&self) -> usize {
        [
            self.calls.len(),
            self.units.len(),
            self.deleted_units.len(),
            self.deleted_calls.len(),
            self.bolos.len(),
            self.deleted_bolos.len(),
            self.duty_logs.len(),
        ]
        .iter()
        .sum()
    }
}

/// The persisted roster as loaded at start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterData {
    /// Every status across all departments.
    pub statuses: Vec<StatusValue>,
    /// Every registered unit.
    pub units: Vec<Unit>,
    /// Every open call with links and notes.
    pub calls: Vec<Call>,
    /// Every active BOLO.
    pub bolos: Vec<Bolo>,
    /// Duty logs that have not been closed yet.
    pub open_duty_logs: Vec<DutyLog>,
}
