//! Shared type definitions for the dispatch roster synchronization engine.
//!
//! This crate is the single source of truth for every type that crosses a
//! boundary: between the mutation layer and the store, and between the
//! server and connected clients. Wire types derive `ts-rs` so console and
//! field clients get matching `TypeScript` definitions.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Unit kinds, status effects, BOLO types, event classification
//! - [`structs`] -- Units, statuses, calls, BOLOs, duty logs
//! - [`events`] -- Broadcast events, resync snapshots, session frames
//! - [`payloads`] -- Validated mutation request bodies
//! - [`actor`] -- The caller identity handed to every mutation

pub mod actor;
pub mod enums;
pub mod events;
pub mod ids;
pub mod payloads;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use actor::Actor;
pub use enums::{BoloType, ChangeKind, EntityKind, ShouldDo, UnitKind, UnknownVariant};
pub use events::{
    Broadcast, BroadcastBody, ClientMessage, EntityPayload, EntityRef, RosterSnapshot,
    ServerMessage, SyncEvent,
};
pub use ids::{
    BoloId, CallEventId, CallId, DepartmentId, DivisionId, DutyLogId, StatusId, UnitId, UserId,
};
pub use payloads::{BoloPayload, CallEventPayload, CallPayload, StatusChange, UnitPayload};
pub use structs::{AssignedUnit, Bolo, Call, CallEvent, DutyLog, StatusValue, Unit};
