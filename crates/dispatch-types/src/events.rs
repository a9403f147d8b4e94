//! Broadcast and resync message types.
//!
//! A [`SyncEvent`] is the normalized description of one accepted mutation
//! for one entity: its kind, whether it was upserted or deleted, and the
//! full post-mutation snapshot (or only the id for deletes). Clients never
//! receive field-level patches, so merging an event is a replace-by-id and
//! stays idempotent under duplicate delivery.
//!
//! The broadcaster wraps every event in a [`Broadcast`] carrying a
//! session-visible sequence number; [`ServerMessage`] and [`ClientMessage`]
//! are the JSON frames exchanged over the session channel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::enums::{ChangeKind, EntityKind};
use crate::ids::{BoloId, CallId, DepartmentId, UnitId};
use crate::structs::{Bolo, Call, StatusValue, Unit};

// ---------------------------------------------------------------------------
// SyncEvent
// ---------------------------------------------------------------------------

/// The payload of a [`SyncEvent`].
///
/// Serialized untagged: the surrounding event's `entityKind` and
/// `changeKind` say which variant to expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(untagged)]
#[ts(export, export_to = "bindings/")]
pub enum EntityPayload {
    /// Full unit snapshot.
    Unit(Box<Unit>),
    /// Full call snapshot.
    Call(Box<Call>),
    /// Full BOLO snapshot.
    Bolo(Box<Bolo>),
    /// Id-only reference for deletes.
    Removed(EntityRef),
}

/// Id-only reference to a removed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EntityRef {
    /// The removed entity's id.
    pub id: Uuid,
}

/// One accepted change to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct SyncEvent {
    /// Roster revision at which the change was committed.
    #[ts(type = "number")]
    pub revision: u64,
    /// Which kind of entity changed.
    pub entity_kind: EntityKind,
    /// Upsert or delete.
    pub change_kind: ChangeKind,
    /// Full snapshot, or the id for deletes.
    pub entity: EntityPayload,
}

impl SyncEvent {
    /// Upsert event for a unit snapshot.
    pub fn unit_upsert(unit: &Unit) -> Self {
        Self {
            revision: unit.revision,
            entity_kind: EntityKind::Unit,
            change_kind: ChangeKind::Upsert,
            entity: EntityPayload::Unit(Box::new(unit.clone())),
        }
    }

    /// Upsert event for a call snapshot.
    pub fn call_upsert(call: &Call) -> Self {
        Self {
            revision: call.revision,
            entity_kind: EntityKind::Call,
            change_kind: ChangeKind::Upsert,
            entity: EntityPayload::Call(Box::new(call.clone())),
        }
    }

    /// Upsert event for a BOLO snapshot.
    pub fn bolo_upsert(bolo: &Bolo) -> Self {
        Self {
            revision: bolo.revision,
            entity_kind: EntityKind::Bolo,
            change_kind: ChangeKind::Upsert,
            entity: EntityPayload::Bolo(Box::new(bolo.clone())),
        }
    }

    /// Delete event for a unit.
    pub const fn unit_deleted(id: UnitId, revision: u64) -> Self {
        Self::deleted(EntityKind::Unit, id.into_inner(), revision)
    }

    /// Delete event for a call.
    pub const fn call_deleted(id: CallId, revision: u64) -> Self {
        Self::deleted(EntityKind::Call, id.into_inner(), revision)
    }

    /// Delete event for a BOLO.
    pub const fn bolo_deleted(id: BoloId, revision: u64) -> Self {
        Self::deleted(EntityKind::Bolo, id.into_inner(), revision)
    }

    const fn deleted(entity_kind: EntityKind, id: Uuid, revision: u64) -> Self {
        Self {
            revision,
            entity_kind,
            change_kind: ChangeKind::Delete,
            entity: EntityPayload::Removed(EntityRef { id }),
        }
    }

    /// The `(kind, id)` pair identifying the entity this event is about.
    pub fn key(&self) -> (EntityKind, Uuid) {
        let id = match &self.entity {
            EntityPayload::Unit(u) => u.id.into_inner(),
            EntityPayload::Call(c) => c.id.into_inner(),
            EntityPayload::Bolo(b) => b.id.into_inner(),
            EntityPayload::Removed(r) => r.id,
        };
        (self.entity_kind, id)
    }
}

// ---------------------------------------------------------------------------
// Broadcast envelope
// ---------------------------------------------------------------------------

/// What the broadcaster fans out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastBody {
    /// An entity change.
    Event(SyncEvent),
    /// A department's status catalog changed; clients should re-fetch it.
    CatalogInvalidated(DepartmentId),
}

/// A [`BroadcastBody`] stamped with the broadcaster's sequence number.
///
/// Every connected session observes the same contiguous sequence, so a
/// hole in the numbers means the session missed something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    /// Global publish sequence number, starting at 1.
    pub seq: u64,
    /// The published content.
    pub body: BroadcastBody,
}

// ---------------------------------------------------------------------------
// Resync snapshot
// ---------------------------------------------------------------------------

/// A consistent copy of the whole roster at one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct RosterSnapshot {
    /// Highest revision reflected in this snapshot.
    #[ts(type = "number")]
    pub revision: u64,
    /// Every registered unit, on duty or not.
    pub units: BTreeMap<UnitId, Unit>,
    /// Every open call.
    pub calls: BTreeMap<CallId, Call>,
    /// Every active BOLO.
    pub bolos: BTreeMap<BoloId, Bolo>,
    /// The full status catalog across departments.
    pub statuses: Vec<StatusValue>,
}

// ---------------------------------------------------------------------------
// Session channel frames
// ---------------------------------------------------------------------------

/// Frames pushed from the server to a connected session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum ServerMessage {
    /// An entity change.
    Event {
        /// Broadcast sequence number.
        #[ts(type = "number")]
        seq: u64,
        /// The change itself.
        #[serde(flatten)]
        event: SyncEvent,
    },
    /// A department's status catalog changed.
    CatalogInvalidated {
        /// Broadcast sequence number.
        #[ts(type = "number")]
        seq: u64,
        /// The department whose catalog changed.
        #[serde(rename = "departmentId")]
        department_id: DepartmentId,
    },
    /// Full resync snapshot, sent in answer to [`ClientMessage::Resync`].
    Snapshot {
        /// The snapshot.
        snapshot: Box<RosterSnapshot>,
    },
    /// The session fell behind and was dropped from the fan-out; the
    /// client must discard its mirror and request a resync.
    ResyncRequired,
    /// A department's status catalog, in answer to [`ClientMessage::Statuses`].
    Statuses {
        /// The department.
        #[serde(rename = "departmentId")]
        department_id: DepartmentId,
        /// Ordered statuses.
        statuses: Vec<StatusValue>,
    },
    /// The last client frame could not be handled.
    Error {
        /// What went wrong.
        message: String,
    },
}

impl From<Broadcast> for ServerMessage {
    fn from(broadcast: Broadcast) -> Self {
        match broadcast.body {
            BroadcastBody::Event(event) => Self::Event {
                seq: broadcast.seq,
                event,
            },
            BroadcastBody::CatalogInvalidated(department_id) => Self::CatalogInvalidated {
                seq: broadcast.seq,
                department_id,
            },
        }
    }
}

/// Frames a session may send to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum ClientMessage {
    /// Request a full [`ServerMessage::Snapshot`].
    Resync,
    /// Request one department's ordered status catalog.
    Statuses {
        /// The department.
        #[serde(rename = "departmentId")]
        department_id: DepartmentId,
    },
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::enums::BoloType;

    fn bolo() -> Bolo {
        Bolo {
            id: BoloId::new(),
            bolo_type: BoloType::Vehicle,
            description: String::from("Red coupe, fled westbound"),
            name: None,
            plate: Some(String::from("4ABC123")),
            color: Some(String::from("red")),
            author_unit_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            revision: 7,
        }
    }

    #[test]
    fn event_frame_uses_wire_field_names() {
        let bolo = bolo();
        let frame = ServerMessage::from(Broadcast {
            seq: 3,
            body: BroadcastBody::Event(SyncEvent::bolo_upsert(&bolo)),
        });
        let json = serde_json::to_value(&frame).unwrap_or_default();
        assert_eq!(json["type"], "event");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["revision"], 7);
        assert_eq!(json["entityKind"], "bolo");
        assert_eq!(json["changeKind"], "upsert");
        assert_eq!(json["entity"]["type"], "VEHICLE");
    }

    #[test]
    fn delete_event_carries_only_id() {
        let id = CallId::new();
        let event = SyncEvent::call_deleted(id, 12);
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["changeKind"], "delete");
        assert_eq!(json["entity"], serde_json::json!({ "id": id.into_inner() }));
        assert_eq!(event.key(), (EntityKind::Call, id.into_inner()));
    }

    #[test]
    fn upsert_payload_deserializes_to_matching_variant() {
        let bolo = bolo();
        let json = serde_json::to_string(&SyncEvent::bolo_upsert(&bolo)).unwrap_or_default();
        let parsed: Result<SyncEvent, _> = serde_json::from_str(&json);
        assert!(matches!(
            parsed.map(|e| e.entity),
            Ok(EntityPayload::Bolo(b)) if b.id == bolo.id
        ));
    }

    #[test]
    fn client_resync_frame_parses() {
        let parsed: Result<ClientMessage, _> = serde_json::from_str(r#"{"type":"resync"}"#);
        assert_eq!(parsed.ok(), Some(ClientMessage::Resync));
    }
}
