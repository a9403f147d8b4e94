//! The identity handed to every mutation.
//!
//! Authentication lives outside this workspace; whoever terminates the
//! session supplies an [`Actor`] and the mutation layer only checks the
//! capability flags on it.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::UserId;
use crate::structs::Unit;

/// The authenticated caller of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Actor {
    /// The caller's user account.
    pub user_id: UserId,
    /// Holds dispatch authority (may act on any unit or call).
    pub dispatch: bool,
    /// Holds administrative authority (may register and delete units).
    pub admin: bool,
}

impl Actor {
    /// A caller with no elevated authority.
    pub const fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            dispatch: false,
            admin: false,
        }
    }

    /// A caller with dispatch authority.
    pub const fn dispatcher(user_id: UserId) -> Self {
        Self {
            user_id,
            dispatch: true,
            admin: false,
        }
    }

    /// A caller with administrative authority.
    pub const fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            dispatch: false,
            admin: true,
        }
    }

    /// Whether this caller owns `unit`.
    pub fn owns(&self, unit: &Unit) -> bool {
        unit.user_id == self.user_id
    }

    /// Whether this caller may change `unit`'s status.
    pub fn can_manage(&self, unit: &Unit) -> bool {
        self.dispatch || self.owns(unit)
    }
}
