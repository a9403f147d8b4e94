//! Roster state and synchronization for the dispatch engine.
//!
//! This crate owns the live roster and everything that moves it:
//!
//! - [`catalog`] -- Per-department status catalog and its on-duty rule
//! - [`roster`] -- The committed in-memory roster and its read view
//! - [`mutation`] -- [`MutationApi`], the only write path
//! - [`locks`] -- Per-entity locks taken in a canonical order
//! - [`broadcast`] -- Sequenced fan-out to sessions with bounded queues
//! - [`mirror`] -- Client-side reconciliation of snapshots and events
//! - [`sync`] -- An in-process session driving a mirror
//! - [`config`] -- YAML configuration with environment overrides
//! - [`error`] -- Mutation and load errors
//!
//! # Ordering
//!
//! Every committed mutation gets exactly one revision, allocated under
//! the roster write lock, and its events are published before that lock is
//! released. Broadcast sequence order therefore matches revision order,
//! and a snapshot taken at revision `r` reflects exactly the events with
//! revision `<= r`.

pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod error;
pub mod locks;
pub mod mirror;
pub mod mutation;
pub mod roster;
pub mod sync;

pub use broadcast::{Broadcaster, Closed, Subscription, SubscriptionId};
pub use catalog::{CatalogError, StatusCatalog};
pub use config::{ConfigError, DispatchConfig};
pub use error::{LoadError, MutationError};
pub use locks::{EntityGuard, EntityKey, EntityLocks};
pub use mirror::{ApplyOutcome, ClientMirror};
pub use mutation::{MutationApi, MutationOutcome};
pub use roster::{InvariantViolation, Roster, RosterView};
pub use sync::{SessionStep, SyncSession};
