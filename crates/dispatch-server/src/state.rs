//! Shared application state for the dispatch server.
//!
//! [`AppState`] bundles the mutation layer with its read view and
//! broadcaster. Handlers receive it through Axum's `State` extractor
//! wrapped in an [`Arc`](std::sync::Arc).

use dispatch_core::{Broadcaster, MutationApi, RosterView};

/// Shared state for the Axum application.
#[derive(Clone)]
pub struct AppState {
    /// The only write path into the roster.
    pub api: MutationApi,
    /// Read-only access to the committed roster.
    pub view: RosterView,
    /// Session fan-out used by the `WebSocket` endpoint.
    pub broadcaster: Broadcaster,
}

impl AppState {
    /// Build the state around a loaded mutation layer.
    pub fn new(api: MutationApi) -> Self {
        let view = api.view();
        let broadcaster = api.broadcaster().clone();
        Self {
            api,
            view,
            broadcaster,
        }
    }
}
