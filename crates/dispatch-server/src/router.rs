//! Axum router construction for the dispatch server.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS and request tracing. See [`handlers`] for the endpoint
//! table.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// CORS allows any origin; consoles are served from a different origin
/// than the engine.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Session channel
        .route("/ws", get(ws::ws_sync))
        // Health and resync
        .route("/api/health", get(handlers::health))
        .route("/api/sync/snapshot", get(handlers::sync_snapshot))
        // Status catalog
        .route("/api/statuses/{department}", get(handlers::list_statuses))
        .route("/api/admin/statuses/reload", post(handlers::reload_statuses))
        // Units
        .route(
            "/api/units",
            get(handlers::list_units).post(handlers::register_unit),
        )
        .route("/api/units/panicking", get(handlers::list_panicking_units))
        .route(
            "/api/units/{id}",
            get(handlers::get_unit).delete(handlers::delete_unit),
        )
        .route("/api/units/{id}/status", put(handlers::set_unit_status))
        .route("/api/units/{id}/duty-logs", get(handlers::list_duty_logs))
        // Calls
        .route(
            "/api/calls",
            get(handlers::list_calls).post(handlers::create_call),
        )
        .route(
            "/api/calls/{id}",
            get(handlers::get_call)
                .put(handlers::update_call)
                .delete(handlers::end_call),
        )
        .route(
            "/api/calls/{id}/units/{unit}",
            post(handlers::assign_unit).delete(handlers::unassign_unit),
        )
        .route("/api/calls/{id}/events", post(handlers::add_call_event))
        .route(
            "/api/calls/{id}/events/{event}",
            put(handlers::update_call_event).delete(handlers::delete_call_event),
        )
        // BOLOs
        .route(
            "/api/bolos",
            get(handlers::list_bolos).post(handlers::create_bolo),
        )
        .route(
            "/api/bolos/{id}",
            get(handlers::get_bolo)
                .put(handlers::update_bolo)
                .delete(handlers::delete_bolo),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
