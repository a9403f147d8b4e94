//! Error types for the persistence layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] errors with context about which operation failed.

/// Errors that can occur in the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be mapped back onto a roster type.
    #[error("corrupt row in {table}: {message}")]
    CorruptRow {
        /// The table the row came from.
        table: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// The store refused the write (in-memory store fault injection, or a
    /// backend reporting it is not accepting writes).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The writes before commit did not finish in time; nothing was
    /// persisted.
    #[error("store write not staged within {0:?}")]
    Timeout(std::time::Duration),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
