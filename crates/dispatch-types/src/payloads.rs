//! Request payloads for mutations, with shape validation.
//!
//! Payloads are validated with [`validator`] before any state is touched.
//! Validation only covers shape (required text, length limits); rules that
//! depend on roster state live in the mutation layer.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use validator::{Validate, ValidationError};

use crate::enums::{BoloType, UnitKind};
use crate::ids::{DepartmentId, DivisionId, StatusId, UnitId, UserId};

/// Maximum length of short free-text fields (names, locations, plates).
pub const MAX_SHORT_TEXT: u64 = 255;

/// Maximum length of long free-text fields (descriptions, notes).
pub const MAX_LONG_TEXT: u64 = 4000;

/// Reject strings that are empty after trimming.
fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Body of a create-call or update-call request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct CallPayload {
    /// Caller name (may be empty).
    #[serde(default)]
    #[validate(length(max = MAX_SHORT_TEXT))]
    pub name: String,
    /// Where the incident is.
    #[validate(custom(function = "not_blank"), length(max = MAX_SHORT_TEXT))]
    pub location: String,
    /// What is happening (may be empty).
    #[serde(default)]
    #[validate(length(max = MAX_LONG_TEXT))]
    pub description: String,
    /// Desired assigned-unit set. Only honored by updates; `None` leaves
    /// the current set unchanged.
    #[serde(default)]
    pub assigned_units: Option<Vec<UnitId>>,
}

/// Body of a create-BOLO or update-BOLO request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct BoloPayload {
    /// What kind of subject this BOLO describes.
    #[serde(rename = "type")]
    pub bolo_type: BoloType,
    /// Description of the subject.
    #[validate(custom(function = "not_blank"), length(max = MAX_LONG_TEXT))]
    pub description: String,
    /// Person name.
    #[serde(default)]
    #[validate(length(max = MAX_SHORT_TEXT))]
    pub name: Option<String>,
    /// Vehicle plate.
    #[serde(default)]
    #[validate(length(max = MAX_SHORT_TEXT))]
    pub plate: Option<String>,
    /// Vehicle color.
    #[serde(default)]
    #[validate(length(max = MAX_SHORT_TEXT))]
    pub color: Option<String>,
    /// The unit issuing the BOLO.
    #[serde(default)]
    pub author_unit_id: Option<UnitId>,
}

/// Body of a status-change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct StatusChange {
    /// The status to switch to.
    pub status_id: StatusId,
}

/// Body of a call-note request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct CallEventPayload {
    /// Note text.
    #[validate(custom(function = "not_blank"), length(max = MAX_LONG_TEXT))]
    pub description: String,
}

/// Body of an administrative unit registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct UnitPayload {
    /// Officer or EMS/FD deputy.
    pub kind: UnitKind,
    /// Display name.
    #[validate(custom(function = "not_blank"), length(max = MAX_SHORT_TEXT))]
    pub name: String,
    /// Primary callsign fragment.
    #[validate(custom(function = "not_blank"), length(max = MAX_SHORT_TEXT))]
    pub callsign: String,
    /// Secondary callsign fragment.
    #[serde(default)]
    #[validate(length(max = MAX_SHORT_TEXT))]
    pub callsign2: String,
    /// Owning department.
    pub department_id: DepartmentId,
    /// Division within the department.
    pub division_id: DivisionId,
    /// Badge number.
    #[serde(default)]
    pub badge_number: Option<u32>,
    /// The owning user account.
    pub user_id: UserId,
    /// Whether the unit starts suspended.
    #[serde(default)]
    pub suspended: bool,
}
