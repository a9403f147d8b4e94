//! Enumeration types shared by the roster engine, the store, and clients.
//!
//! Enums that are persisted carry an `as_str` / `FromStr` pair so the
//! store can write them as `TEXT` columns without a second mapping table.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Error returned when a persisted enum value cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The unrecognized input.
    pub value: String,
}

impl core::fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown {} value: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

// ---------------------------------------------------------------------------
// Unit kind
// ---------------------------------------------------------------------------

/// Which roster a unit belongs to.
///
/// Officers and EMS/FD deputies share one registry and one assignment
/// model; the kind only drives filtering in roster views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export, export_to = "bindings/")]
pub enum UnitKind {
    /// Law-enforcement officer.
    Leo,
    /// EMS or fire deputy.
    EmsFd,
}

impl UnitKind {
    /// Stable string form used by the store.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Leo => "leo",
            Self::EmsFd => "ems-fd",
        }
    }
}

impl core::str::FromStr for UnitKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leo" => Ok(Self::Leo),
            "ems-fd" => Ok(Self::EmsFd),
            other => Err(UnknownVariant {
                kind: "unit kind",
                value: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Status effect
// ---------------------------------------------------------------------------

/// The effect a status code has on the unit that selects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum ShouldDo {
    /// Puts the unit on the active roster. Always catalog position 0.
    SetOnDuty,
    /// Takes the unit off the roster and detaches it from its call.
    SetOffDuty,
    /// Marks the unit as committed to a call.
    SetAssigned,
    /// Generic activity code with no side effects.
    SetStatus,
    /// Signals the unit needs immediate assistance.
    PanicButton,
}

impl ShouldDo {
    /// Stable string form used by the store.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SetOnDuty => "SET_ON_DUTY",
            Self::SetOffDuty => "SET_OFF_DUTY",
            Self::SetAssigned => "SET_ASSIGNED",
            Self::SetStatus => "SET_STATUS",
            Self::PanicButton => "PANIC_BUTTON",
        }
    }

    /// Whether a unit holding a status with this effect is on the roster.
    pub const fn is_on_roster(self) -> bool {
        !matches!(self, Self::SetOffDuty)
    }
}

impl core::str::FromStr for ShouldDo {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SET_ON_DUTY" => Ok(Self::SetOnDuty),
            "SET_OFF_DUTY" => Ok(Self::SetOffDuty),
            "SET_ASSIGNED" => Ok(Self::SetAssigned),
            "SET_STATUS" => Ok(Self::SetStatus),
            "PANIC_BUTTON" => Ok(Self::PanicButton),
            other => Err(UnknownVariant {
                kind: "status effect",
                value: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// BOLO type
// ---------------------------------------------------------------------------

/// What a BOLO is looking out for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum BoloType {
    /// A wanted or missing person.
    Person,
    /// A vehicle, usually identified by plate and color.
    Vehicle,
    /// Anything else.
    Other,
}

impl BoloType {
    /// Stable string form used by the store.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Vehicle => "VEHICLE",
            Self::Other => "OTHER",
        }
    }
}

impl core::str::FromStr for BoloType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERSON" => Ok(Self::Person),
            "VEHICLE" => Ok(Self::Vehicle),
            "OTHER" => Ok(Self::Other),
            other => Err(UnknownVariant {
                kind: "bolo type",
                value: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Broadcast classification
// ---------------------------------------------------------------------------

/// The kind of entity a broadcast event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum EntityKind {
    /// A field unit.
    Unit,
    /// A 911 call.
    Call,
    /// A BOLO alert.
    Bolo,
}

/// Whether an event replaces or removes its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum ChangeKind {
    /// The entity was created or updated; the payload is its full snapshot.
    Upsert,
    /// The entity was removed; the payload carries only its id.
    Delete,
}
