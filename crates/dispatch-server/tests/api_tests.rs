//! Integration tests for the dispatch API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. The roster is backed by the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use dispatch_core::{Broadcaster, MutationApi};
use dispatch_db::{MemoryStore, RosterData};
use dispatch_server::actor::{ADMIN_HEADER, DISPATCH_HEADER, USER_ID_HEADER};
use dispatch_server::{AppState, build_router};
use dispatch_types::{
    DepartmentId, DivisionId, ShouldDo, StatusId, StatusValue, Unit, UnitId, UnitKind, UserId,
};
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: MemoryStore,
    dept: DepartmentId,
    on_duty: StatusId,
    off_duty: StatusId,
    unit: UnitId,
    owner: UserId,
}

async fn make_test_app() -> TestApp {
    let dept = DepartmentId::new();
    let on = StatusValue {
        id: StatusId::new(),
        value: String::from("10-8"),
        department_id: dept,
        should_do: ShouldDo::SetOnDuty,
        position: 0,
        color: Some(String::from("green")),
    };
    let off = StatusValue {
        id: StatusId::new(),
        value: String::from("10-7"),
        department_id: dept,
        should_do: ShouldDo::SetOffDuty,
        position: 1,
        color: None,
    };
    let owner = UserId::new();
    let unit = Unit {
        id: UnitId::new(),
        kind: UnitKind::Leo,
        name: String::from("J. Doe"),
        callsign: String::from("2L"),
        callsign2: String::from("14"),
        department_id: dept,
        division_id: DivisionId::new(),
        badge_number: Some(4411),
        status_id: None,
        assigned_call_id: None,
        suspended: false,
        user_id: owner,
        updated_at: Utc::now(),
        revision: 0,
    };

    let store = MemoryStore::with_data(RosterData {
        statuses: vec![on.clone(), off.clone()],
        units: vec![unit.clone()],
        ..RosterData::default()
    });
    let api = MutationApi::load(
        store.clone().into(),
        Broadcaster::new(64),
        Duration::from_secs(2),
    )
    .await
    .unwrap();

    TestApp {
        router: build_router(Arc::new(AppState::new(api))),
        store,
        dept,
        on_duty: on.id,
        off_duty: off.id,
        unit: unit.id,
        owner,
    }
}

#[derive(Clone, Copy)]
enum As {
    Anonymous,
    User(UserId),
    Dispatch,
    Admin,
}

fn request(method: &str, uri: &str, who: As, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    match who {
        As::Anonymous => {}
        As::User(id) => builder = builder.header(USER_ID_HEADER, id.to_string()),
        As::Dispatch => {
            builder = builder
                .header(USER_ID_HEADER, UserId::new().to_string())
                .header(DISPATCH_HEADER, "true");
        }
        As::Admin => {
            builder = builder
                .header(USER_ID_HEADER, UserId::new().to_string())
                .header(ADMIN_HEADER, "true");
        }
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn go_on_duty(app: &TestApp) {
    let (status, _) = send(
        app,
        request(
            "PUT",
            &format!("/api/units/{}/status", app.unit),
            As::User(app.owner),
            Some(json!({ "statusId": app.on_duty })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

async fn open_call(app: &TestApp) -> String {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/calls",
            As::Dispatch,
            Some(json!({ "name": "", "location": "Harbor Rd", "description": "Boat fire" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["entity"]["id"].as_str().unwrap().to_owned()
}

// =========================================================================
// Reads
// =========================================================================

#[tokio::test]
async fn health_reports_revision() {
    let app = make_test_app().await;
    let (status, body) = send(&app, request("GET", "/api/health", As::Anonymous, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["revision"], 0);
}

#[tokio::test]
async fn statuses_are_listed_in_position_order() {
    let app = make_test_app().await;
    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/api/statuses/{}", app.dept),
            As::Anonymous,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let values: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["value"].as_str().unwrap())
        .collect();
    assert_eq!(values, ["10-8", "10-7"]);
}

#[tokio::test]
async fn bad_path_id_is_bad_request() {
    let app = make_test_app().await;
    let (status, body) = send(&app, request("GET", "/api/units/nope", As::Anonymous, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "badRequest");
}

#[tokio::test]
async fn unknown_call_is_not_found() {
    let app = make_test_app().await;
    let uri = format!("/api/calls/{}", uuid::Uuid::now_v7());
    let (status, body) = send(&app, request("GET", &uri, As::Anonymous, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn units_default_to_active_scope() {
    let app = make_test_app().await;
    let (_, body) = send(&app, request("GET", "/api/units", As::Anonymous, None)).await;
    assert!(body.as_array().unwrap().is_empty());

    let (_, body) = send(
        &app,
        request("GET", "/api/units?scope=all&kind=leo", As::Anonymous, None),
    )
    .await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    go_on_duty(&app).await;
    let (_, body) = send(&app, request("GET", "/api/units", As::Anonymous, None)).await;
    assert_eq!(body[0]["callsign"], "2L");
}

// =========================================================================
// Mutations
// =========================================================================

#[tokio::test]
async fn mutations_require_identity() {
    let app = make_test_app().await;
    let (status, body) = send(
        &app,
        request(
            "PUT",
            &format!("/api/units/{}/status", app.unit),
            As::Anonymous,
            Some(json!({ "statusId": app.on_duty })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");
}

#[tokio::test]
async fn status_change_returns_entity_and_events() {
    let app = make_test_app().await;
    let (status, body) = send(
        &app,
        request(
            "PUT",
            &format!("/api/units/{}/status", app.unit),
            As::User(app.owner),
            Some(json!({ "statusId": app.on_duty })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entity"]["statusId"], app.on_duty.to_string());
    assert_eq!(body["events"][0]["entityKind"], "unit");
    assert_eq!(body["events"][0]["changeKind"], "upsert");

    let (status, body) = send(
        &app,
        request(
            "PUT",
            &format!("/api/units/{}/status", app.unit),
            As::User(UserId::new()),
            Some(json!({ "statusId": app.off_duty })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");
}

#[tokio::test]
async fn call_lifecycle_over_http() {
    let app = make_test_app().await;
    go_on_duty(&app).await;
    let call = open_call(&app).await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/api/calls/{call}/units/{}", app.unit),
            As::Dispatch,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entity"]["assignedUnits"][0]["unitId"], app.unit.to_string());

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/api/calls/{call}/events"),
            As::Dispatch,
            Some(json!({ "description": "Fire department en route" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, request("DELETE", &format!("/api/calls/{call}"), As::Dispatch, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"][1]["changeKind"], "delete");

    let (status, body) = send(&app, request("DELETE", &format!("/api/calls/{call}"), As::Dispatch, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "notFound");
}

#[tokio::test]
async fn call_payload_is_validated() {
    let app = make_test_app().await;
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/calls",
            As::Dispatch,
            Some(json!({ "location": "   ", "description": "x" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "invalid");
}

#[tokio::test]
async fn off_roster_assignment_conflicts() {
    let app = make_test_app().await;
    let call = open_call(&app).await;
    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/api/calls/{call}/units/{}", app.unit),
            As::Dispatch,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
}

#[tokio::test]
async fn store_outage_is_retryable_503() {
    let app = make_test_app().await;
    app.store.set_unavailable(true);
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/bolos",
            As::Dispatch,
            Some(json!({ "type": "PERSON", "description": "Tall, red jacket" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);

    app.store.set_unavailable(false);
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/bolos",
            As::Dispatch,
            Some(json!({ "type": "PERSON", "description": "Tall, red jacket" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["entity"]["type"], "PERSON");
}

#[tokio::test]
async fn admin_routes_check_authority() {
    let app = make_test_app().await;
    let payload = json!({
        "kind": "ems-fd",
        "name": "Station 3",
        "callsign": "E3",
        "departmentId": app.dept,
        "divisionId": DivisionId::new(),
        "userId": UserId::new(),
    });

    let (status, _) = send(
        &app,
        request("POST", "/api/units", As::Dispatch, Some(payload.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, request("POST", "/api/units", As::Admin, Some(payload))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["entity"]["id"].as_str().unwrap().to_owned();

    let (status, _) = send(&app, request("DELETE", &format!("/api/units/{id}"), As::Admin, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request("POST", "/api/admin/statuses/reload", As::Admin, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["changedDepartments"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn duty_logs_and_snapshot_reflect_mutations() {
    let app = make_test_app().await;
    go_on_duty(&app).await;

    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/api/units/{}/duty-logs", app.unit),
            As::Anonymous,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body[0]["endedAt"].is_null());

    let (status, body) = send(&app, request("GET", "/api/sync/snapshot", As::Anonymous, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revision"], 1);
    assert_eq!(
        body["units"][app.unit.to_string()]["statusId"],
        app.on_duty.to_string()
    );
}
