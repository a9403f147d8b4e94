//! REST API endpoint handlers for the dispatch server.
//!
//! Reads are served from the committed in-memory roster through
//! [`RosterView`](dispatch_core::RosterView). Mutations go through
//! [`MutationApi`](dispatch_core::MutationApi) and answer with
//! `{ "entity": ..., "events": [...] }`, where `events` is exactly what was
//! broadcast (empty when nothing changed).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/health` | Revision, sessions, sequence |
//! | `GET` | `/api/sync/snapshot` | Full resync snapshot |
//! | `GET` | `/api/statuses/{department}` | Ordered status catalog |
//! | `POST` | `/api/admin/statuses/reload` | Reload catalog from the store |
//! | `GET` | `/api/units` | Units (`?kind=leo`, `?scope=all`) |
//! | `POST` | `/api/units` | Register a unit |
//! | `GET` | `/api/units/panicking` | Active units with a panic status |
//! | `GET` | `/api/units/{id}` | One unit |
//! | `DELETE` | `/api/units/{id}` | Delete a unit |
//! | `PUT` | `/api/units/{id}/status` | Change a unit's status |
//! | `GET` | `/api/units/{id}/duty-logs` | Duty history |
//! | `GET` | `/api/calls` | Open calls |
//! | `POST` | `/api/calls` | Open a call |
//! | `GET` | `/api/calls/{id}` | One call |
//! | `PUT` | `/api/calls/{id}` | Edit a call and its assigned set |
//! | `DELETE` | `/api/calls/{id}` | End a call |
//! | `POST` | `/api/calls/{id}/units/{unit}` | Assign a unit |
//! | `DELETE` | `/api/calls/{id}/units/{unit}` | Unassign a unit |
//! | `POST` | `/api/calls/{id}/events` | Add a call note |
//! | `PUT` | `/api/calls/{id}/events/{event}` | Edit a call note |
//! | `DELETE` | `/api/calls/{id}/events/{event}` | Remove a call note |
//! | `GET` | `/api/bolos` | Active BOLOs |
//! | `POST` | `/api/bolos` | Issue a BOLO |
//! | `GET` | `/api/bolos/{id}` | One BOLO |
//! | `PUT` | `/api/bolos/{id}` | Edit a BOLO |
//! | `DELETE` | `/api/bolos/{id}` | Withdraw a BOLO |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use dispatch_types::{
    BoloId, BoloPayload, CallEventId, CallEventPayload, CallId, CallPayload, DepartmentId,
    StatusChange, UnitId, UnitKind, UnitPayload,
};
use uuid::Uuid;

use crate::actor::Caller;
use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/units`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct UnitsQuery {
    /// Only units of this kind (`leo` or `ems-fd`).
    pub kind: Option<UnitKind>,
    /// `active` (default) for on-roster units, `all` for every unit.
    pub scope: Option<String>,
}

// ---------------------------------------------------------------------------
// Health and sync
// ---------------------------------------------------------------------------

/// Report the committed revision and broadcaster state.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "revision": state.view.revision().await,
        "sessions": state.broadcaster.session_count(),
        "seq": state.broadcaster.last_seq(),
    }))
}

/// Full collections keyed by id plus the revision watermark.
pub async fn sync_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.view.snapshot().await)
}

// ---------------------------------------------------------------------------
// Status catalog
// ---------------------------------------------------------------------------

/// One department's statuses in position order.
pub async fn list_statuses(
    State(state): State<Arc<AppState>>,
    Path(department): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let department: DepartmentId = parse_id(&department)?;
    Ok(Json(state.view.list_statuses(department).await))
}

/// Re-read the status catalog from the store (admin only).
pub async fn reload_statuses(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
) -> Result<impl IntoResponse, ApiError> {
    let changed = state.api.reload_catalog_from_store(actor).await?;
    Ok(Json(serde_json::json!({ "changedDepartments": changed })))
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// List units, on-roster ones by default.
pub async fn list_units(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UnitsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let units = match params.scope.as_deref().unwrap_or("active") {
        "active" => state.view.list_active_units(params.kind).await,
        "all" => state
            .view
            .list_units()
            .await
            .into_iter()
            .filter(|u| params.kind.is_none_or(|kind| u.kind == kind))
            .collect(),
        other => return Err(ApiError::BadRequest(format!("unknown scope {other}"))),
    };
    Ok(Json(units))
}

/// Active units currently signalling a panic.
pub async fn list_panicking_units(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.view.list_panicking_units().await)
}

/// One unit.
pub async fn get_unit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: UnitId = parse_id(&id)?;
    let unit = state
        .view
        .get_unit(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("unit {id}")))?;
    Ok(Json(unit))
}

/// Change a unit's status.
pub async fn set_unit_status(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(body): Json<StatusChange>,
) -> Result<impl IntoResponse, ApiError> {
    let id: UnitId = parse_id(&id)?;
    let outcome = state.api.set_unit_status(id, body.status_id, actor).await?;
    Ok(Json(outcome))
}

/// Register a unit (admin only).
pub async fn register_unit(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Json(body): Json<UnitPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.api.register_unit(&body, actor).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Delete a unit (admin only).
pub async fn delete_unit(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: UnitId = parse_id(&id)?;
    Ok(Json(state.api.delete_unit(id, actor).await?))
}

/// A unit's duty periods, newest first.
pub async fn list_duty_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: UnitId = parse_id(&id)?;
    if state.view.get_unit(id).await.is_none() {
        return Err(ApiError::NotFound(format!("unit {id}")));
    }
    Ok(Json(state.view.duty_logs(id).await?))
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// Every open call.
pub async fn list_calls(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.view.list_open_calls().await)
}

/// One open call.
pub async fn get_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: CallId = parse_id(&id)?;
    let call = state
        .view
        .get_call(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("call {id}")))?;
    Ok(Json(call))
}

/// Open a call.
pub async fn create_call(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Json(body): Json<CallPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.api.create_call(&body, actor).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Edit a call; `assignedUnits` replaces the assigned set when present.
pub async fn update_call(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(body): Json<CallPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let id: CallId = parse_id(&id)?;
    Ok(Json(state.api.update_call(id, &body, actor).await?))
}

/// End a call.
pub async fn end_call(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: CallId = parse_id(&id)?;
    Ok(Json(state.api.end_call(id, actor).await?))
}

/// Assign one unit to a call.
pub async fn assign_unit(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path((call, unit)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let call: CallId = parse_id(&call)?;
    let unit: UnitId = parse_id(&unit)?;
    Ok(Json(state.api.assign_unit(call, unit, actor).await?))
}

/// Remove one unit from a call.
pub async fn unassign_unit(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path((call, unit)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let call: CallId = parse_id(&call)?;
    let unit: UnitId = parse_id(&unit)?;
    Ok(Json(state.api.unassign_unit(call, unit, actor).await?))
}

/// Append a note to a call.
pub async fn add_call_event(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(body): Json<CallEventPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let id: CallId = parse_id(&id)?;
    let outcome = state.api.add_call_event(id, &body, actor).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Rewrite a call note.
pub async fn update_call_event(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path((call, event)): Path<(String, String)>,
    Json(body): Json<CallEventPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let call: CallId = parse_id(&call)?;
    let event: CallEventId = parse_id(&event)?;
    Ok(Json(
        state
            .api
            .update_call_event(call, event, &body, actor)
            .await?,
    ))
}

/// Remove a call note.
pub async fn delete_call_event(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path((call, event)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let call: CallId = parse_id(&call)?;
    let event: CallEventId = parse_id(&event)?;
    Ok(Json(state.api.delete_call_event(call, event, actor).await?))
}

// ---------------------------------------------------------------------------
// BOLOs
// ---------------------------------------------------------------------------

/// Every active BOLO.
pub async fn list_bolos(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.view.list_active_bolos().await)
}

/// One BOLO.
pub async fn get_bolo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: BoloId = parse_id(&id)?;
    let bolo = state
        .view
        .get_bolo(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("bolo {id}")))?;
    Ok(Json(bolo))
}

/// Issue a BOLO.
pub async fn create_bolo(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Json(body): Json<BoloPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.api.create_bolo(&body, actor).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Edit a BOLO.
pub async fn update_bolo(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(body): Json<BoloPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let id: BoloId = parse_id(&id)?;
    Ok(Json(state.api.update_bolo(id, &body, actor).await?))
}

/// Withdraw a BOLO.
pub async fn delete_bolo(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: BoloId = parse_id(&id)?;
    Ok(Json(state.api.delete_bolo(id, actor).await?))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a typed id from a path segment.
fn parse_id<T: From<Uuid>>(s: &str) -> Result<T, ApiError> {
    s.parse::<Uuid>()
        .map(T::from)
        .map_err(|e| ApiError::BadRequest(format!("invalid id {s}: {e}")))
}
