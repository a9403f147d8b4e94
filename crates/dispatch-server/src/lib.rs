//! HTTP and `WebSocket` surface for the dispatch synchronization engine.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) that pushes sequenced roster events,
//!   catalog invalidations, and resync snapshots to consoles and field
//!   clients
//! - **REST endpoints** for reading the roster and for every mutation
//!   (status changes, calls and their assigned units, call notes, BOLOs,
//!   unit registration)
//! - **Resync endpoint** (`/api/sync/snapshot`) returning the full roster
//!   at one revision
//!
//! # Architecture
//!
//! Reads come from the committed in-memory roster and never touch the
//! store, except duty history. Writes go through
//! [`MutationApi`](dispatch_core::MutationApi), which persists before it
//! commits and broadcasts. Caller identity arrives in gateway headers and
//! is extracted by [`actor::Caller`].

pub mod actor;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
