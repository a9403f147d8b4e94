//! Errors returned by the mutation layer.
//!
//! Every error is synchronous and final: nothing was persisted, nothing
//! changed in memory, and nothing was broadcast.

use dispatch_db::DbError;
use validator::ValidationErrors;

use crate::catalog::CatalogError;

/// Why a mutation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of the missing entity.
        entity: &'static str,
        /// Its id.
        id: String,
    },

    /// The actor is not allowed to do this.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The request is well-formed but collides with current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request is malformed or violates a roster rule.
    #[error("invalid: {0}")]
    Invalid(String),

    /// The store did not accept the write in time. Safe to retry.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl MutationError {
    /// Shorthand for [`Self::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the same request may succeed if sent again unchanged.
    pub const fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Stable machine-readable name of the error kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "notFound",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::Invalid(_) => "invalid",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

impl From<ValidationErrors> for MutationError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Invalid(errors.to_string())
    }
}

impl From<DbError> for MutationError {
    fn from(error: DbError) -> Self {
        Self::Unavailable(error.to_string())
    }
}

/// Why the roster could not be loaded at start-up.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The store could not be read.
    #[error("failed to load roster: {0}")]
    Store(#[from] DbError),

    /// The stored statuses do not form a valid catalog.
    #[error("stored status catalog is invalid: {0}")]
    Catalog(#[from] CatalogError),
}
