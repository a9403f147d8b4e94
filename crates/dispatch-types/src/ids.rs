//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every roster entity has a strongly-typed ID so a unit id can never be
//! passed where a call id is expected. All IDs use UUID v7 (time-ordered)
//! so that primary-key order in `PostgreSQL` follows creation order.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl core::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id! {
    /// Unique identifier for a field unit (officer or EMS/FD deputy).
    UnitId
}

define_id! {
    /// Unique identifier for a status code in a department's catalog.
    StatusId
}

define_id! {
    /// Unique identifier for a department.
    DepartmentId
}

define_id! {
    /// Unique identifier for a division within a department.
    DivisionId
}

define_id! {
    /// Unique identifier for a 911 call on the call board.
    CallId
}

define_id! {
    /// Unique identifier for a note attached to a call.
    CallEventId
}

define_id! {
    /// Unique identifier for a be-on-the-lookout alert.
    BoloId
}

define_id! {
    /// Unique identifier for a user account (supplied by the identity layer).
    UserId
}

define_id! {
    /// Unique identifier for an on-duty log entry.
    DutyLogId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let unit = UnitId::new();
        let call = CallId::new();
        assert_ne!(unit.into_inner(), Uuid::nil());
        assert_ne!(call.into_inner(), Uuid::nil());
    }

    #[test]
    fn id_serializes_as_bare_uuid() {
        let id = UnitId::new();
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json, Some(format!("\"{}\"", id.into_inner())));
    }

    #[test]
    fn id_parses_from_str() {
        let id = CallId::new();
        let parsed: Result<CallId, _> = id.to_string().parse();
        assert_eq!(parsed.ok(), Some(id));
        assert!("not-a-uuid".parse::<CallId>().is_err());
    }
}
