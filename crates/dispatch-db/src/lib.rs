//! Persistence layer for the dispatch roster synchronization engine.
//!
//! The engine keeps the live roster in memory and writes every mutation
//! through a store before it is committed or broadcast. A store is either
//! `PostgreSQL` (production) or an in-memory table set (tests and
//! database-less deployments).
//!
//! # Modules
//!
//! - [`changeset`] -- The unit of work one mutation writes
//! - [`postgres`] -- `PostgreSQL` pool, migrations, and roster queries
//! - [`memory`] -- In-memory store with fault injection
//! - [`store`] -- [`RosterStore`], the backend the engine talks to
//! - [`error`] -- Shared error types

pub mod changeset;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use changeset::{Changeset, RosterData};
pub use error::DbError;
pub use memory::MemoryStore;
pub use postgres::{PgRosterStore, PostgresConfig};
pub use store::RosterStore;
