//! Core entity structs for the roster engine.
//!
//! Every entity that is broadcast carries a `revision`: a runtime update
//! marker stamped by the mutation layer at commit time. Revisions are
//! strictly increasing across the whole roster, so a client can tell
//! whether an incoming snapshot is newer than the one it holds. They are
//! not persisted; a restarted process starts a fresh revision space and
//! every client resyncs on reconnect anyway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{BoloType, ShouldDo, UnitKind};
use crate::ids::{
    BoloId, CallEventId, CallId, DepartmentId, DivisionId, DutyLogId, StatusId, UnitId, UserId,
};

// ---------------------------------------------------------------------------
// StatusValue
// ---------------------------------------------------------------------------

/// A department-scoped status code ("10-8", "Traffic stop", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct StatusValue {
    /// Unique status identifier.
    pub id: StatusId,
    /// Display label.
    pub value: String,
    /// The department whose catalog this status belongs to.
    pub department_id: DepartmentId,
    /// What selecting this status does to the unit.
    pub should_do: ShouldDo,
    /// Ordering position within the department catalog.
    pub position: u32,
    /// Optional display color (CSS color string).
    pub color: Option<String>,
}

// ---------------------------------------------------------------------------
// Unit
// ---------------------------------------------------------------------------

/// A field unit tracked by the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Unit {
    /// Unique unit identifier.
    pub id: UnitId,
    /// Officer or EMS/FD deputy.
    pub kind: UnitKind,
    /// Display name.
    pub name: String,
    /// Primary callsign fragment.
    pub callsign: String,
    /// Secondary callsign fragment.
    pub callsign2: String,
    /// Owning department; constrains which statuses the unit may hold.
    pub department_id: DepartmentId,
    /// Division within the department.
    pub division_id: DivisionId,
    /// Badge number, if issued.
    pub badge_number: Option<u32>,
    /// Current status. `None` means the unit is not on the active roster.
    pub status_id: Option<StatusId>,
    /// The single call this unit is currently assigned to.
    pub assigned_call_id: Option<CallId>,
    /// Suspended units cannot change status.
    pub suspended: bool,
    /// The user account that owns this unit.
    pub user_id: UserId,
    /// Last time the unit record changed.
    pub updated_at: DateTime<Utc>,
    /// Roster-wide update marker of the last change to this unit.
    #[serde(default)]
    #[ts(type = "number")]
    pub revision: u64,
}

impl Unit {
    /// Display callsign as rendered on dispatch consoles.
    pub fn display_callsign(&self) -> String {
        format!("{}-{}", self.callsign, self.callsign2)
    }
}

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

/// A live link between a call and a unit assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct AssignedUnit {
    /// The assigned unit.
    pub unit_id: UnitId,
    /// Kind of the assigned unit, so clients can render without a lookup.
    pub kind: UnitKind,
    /// When the unit was assigned.
    pub assigned_at: DateTime<Utc>,
}

/// A timestamped note on a call.
///
/// Notes are also the only place where past assignments survive: when a
/// unit is detached, a note records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct CallEvent {
    /// Unique note identifier.
    pub id: CallEventId,
    /// When the note was written.
    pub created_at: DateTime<Utc>,
    /// Free-text note.
    pub description: String,
}

/// An open 911 call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Call {
    /// Unique call identifier.
    pub id: CallId,
    /// Caller name.
    pub name: String,
    /// Where the incident is.
    pub location: String,
    /// What is happening.
    pub description: String,
    /// The user who created the call.
    pub created_by: UserId,
    /// When the call was created.
    pub created_at: DateTime<Utc>,
    /// Last time the call changed.
    pub updated_at: DateTime<Utc>,
    /// Units currently assigned to this call.
    pub assigned_units: Vec<AssignedUnit>,
    /// Notes, oldest first.
    pub events: Vec<CallEvent>,
    /// Roster-wide update marker of the last change to this call.
    #[serde(default)]
    #[ts(type = "number")]
    pub revision: u64,
}

impl Call {
    /// Whether `unit_id` is in this call's live assigned-unit set.
    pub fn has_unit(&self, unit_id: UnitId) -> bool {
        self.assigned_units.iter().any(|a| a.unit_id == unit_id)
    }

    /// Ids of all assigned units, in assignment order.
    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.assigned_units.iter().map(|a| a.unit_id)
    }
}

// ---------------------------------------------------------------------------
// Bolo
// ---------------------------------------------------------------------------

/// A be-on-the-lookout alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Bolo {
    /// Unique BOLO identifier.
    pub id: BoloId,
    /// What kind of subject this BOLO describes.
    #[serde(rename = "type")]
    pub bolo_type: BoloType,
    /// Description of the subject.
    pub description: String,
    /// Person name, for person BOLOs.
    pub name: Option<String>,
    /// Plate, for vehicle BOLOs.
    pub plate: Option<String>,
    /// Vehicle color, for vehicle BOLOs.
    pub color: Option<String>,
    /// The unit that issued the BOLO, if any.
    pub author_unit_id: Option<UnitId>,
    /// When the BOLO was issued.
    pub created_at: DateTime<Utc>,
    /// Last time the BOLO changed.
    pub updated_at: DateTime<Utc>,
    /// Roster-wide update marker of the last change to this BOLO.
    #[serde(default)]
    #[ts(type = "number")]
    pub revision: u64,
}

// ---------------------------------------------------------------------------
// DutyLog
// ---------------------------------------------------------------------------

/// One continuous on-duty period of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct DutyLog {
    /// Unique log identifier.
    pub id: DutyLogId,
    /// The unit that went on duty.
    pub unit_id: UnitId,
    /// When the unit went on duty.
    pub started_at: DateTime<Utc>,
    /// When the unit went off duty; `None` while still on duty.
    pub ended_at: Option<DateTime<Utc>>,
}
