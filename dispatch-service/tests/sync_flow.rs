use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use dispatch_service::api::{create_router, AppState};
use dispatch_service::hub::BroadcastHub;
use dispatch_service::store::MemoryStore;
use shared::{Delta, Topic};

fn app() -> (Router, Arc<BroadcastHub>) {
    let store = Arc::new(MemoryStore::new());
    let hub = Arc::new(BroadcastHub::new());
    let state = AppState::new(store, hub.clone());
    (create_router(state), hub)
}

fn watch(hub: &BroadcastHub, topic: Topic) -> tokio::sync::mpsc::UnboundedReceiver<Delta> {
    let (conn, rx) = hub.connect();
    hub.subscribe(conn, topic);
    rx
}

async fn request(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            builder.body(Body::from(body.to_string())).unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, value)
}

fn ivan_order() -> Value {
    json!({
        "customerName": "Ivan",
        "phone": "+79990001122",
        "address": "Lenina 1",
        "totalAmount": 5000,
    })
}

#[tokio::test]
async fn create_order_round_trips_and_broadcasts_to_orders_only() {
    let (app, hub) = app();
    let mut orders_rx = watch(&hub, Topic::Orders);
    let mut admin_rx = watch(&hub, Topic::AdminNotifications);

    let (status, order) = request(&app, "POST", "/orders", Some(ivan_order())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["id"], 1);
    assert_eq!(order["status"], "NEW");
    assert_eq!(order["customerName"], "Ivan");

    let delta = orders_rx.recv().await.unwrap();
    assert_eq!(delta.topic, Topic::Orders);
    assert_eq!(delta.entity.unwrap()["id"], 1);
    assert!(admin_rx.try_recv().is_err());

    let (status, listed) = request(&app, "GET", "/orders", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn patching_status_broadcasts_the_full_merged_row() {
    let (app, hub) = app();
    request(&app, "POST", "/orders", Some(ivan_order())).await;

    let mut orders_rx = watch(&hub, Topic::Orders);
    let (status, patched) = request(
        &app,
        "PATCH",
        "/orders/1",
        Some(json!({ "status": "IN_PROGRESS" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["status"], "IN_PROGRESS");
    assert!(!patched["startedAt"].is_null());

    let entity = orders_rx.recv().await.unwrap().entity.unwrap();
    assert_eq!(entity["status"], "IN_PROGRESS");
    assert_eq!(entity["customerName"], "Ivan");
    assert!(!entity["startedAt"].is_null());
}

#[tokio::test]
async fn validation_failures_are_422_and_broadcast_free() {
    let (app, hub) = app();
    let mut orders_rx = watch(&hub, Topic::Orders);

    let (status, body) = request(
        &app,
        "POST",
        "/orders",
        Some(json!({
            "customerName": " ",
            "phone": "+7",
            "address": "x",
            "totalAmount": 100,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("customerName"));
    assert!(orders_rx.try_recv().is_err());

    let (status, _) = request(&app, "GET", "/orders/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn specialist_chat_updates_unread_count_via_store() {
    let (app, hub) = app();
    let (status, specialist) = request(
        &app,
        "POST",
        "/specialists",
        Some(json!({ "telegramId": 777, "name": "Petr", "username": "petr_fix" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sid = specialist["id"].as_i64().unwrap();

    let mut roster_rx = watch(&hub, Topic::Specialists);
    let mut admin_rx = watch(&hub, Topic::AdminNotifications);

    let (status, message) = request(
        &app,
        "POST",
        "/chat/send",
        Some(json!({
            "specialistId": sid,
            "senderType": "SPECIALIST",
            "text": "starting the job",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message["specialistId"], sid);

    assert!(admin_rx.recv().await.is_some());
    let bump = roster_rx.recv().await.unwrap();
    assert_eq!(bump.unread_increment().unwrap().specialist_id, sid);

    let (_, history) = request(&app, "GET", &format!("/chat/specialist/{sid}"), None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (_, roster) = request(&app, "GET", "/specialists", None).await;
    assert_eq!(roster[0]["unreadChatCount"], 1);
}

#[tokio::test]
async fn specialist_detail_joins_history_and_active_order() {
    let (app, _hub) = app();
    let (_, specialist) = request(
        &app,
        "POST",
        "/specialists",
        Some(json!({ "telegramId": 1 })),
    )
    .await;
    let sid = specialist["id"].as_i64().unwrap();

    let mut order = ivan_order();
    order["assignedSpecialistId"] = json!(sid);
    let (_, created) = request(&app, "POST", "/orders", Some(order)).await;
    let oid = created["id"].as_i64().unwrap();

    request(
        &app,
        "PATCH",
        &format!("/orders/{oid}"),
        Some(json!({ "status": "IN_PROGRESS" })),
    )
    .await;

    let (status, detail) = request(&app, "GET", &format!("/specialists/{sid}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["id"], sid);
    assert_eq!(detail["orders"].as_array().unwrap().len(), 1);
    assert_eq!(detail["activeOrder"]["id"], oid);
}

#[tokio::test]
async fn shift_toggle_shows_up_on_the_on_shift_read_path() {
    let (app, hub) = app();
    let (_, specialist) = request(
        &app,
        "POST",
        "/specialists",
        Some(json!({ "telegramId": 5 })),
    )
    .await;
    let sid = specialist["id"].as_i64().unwrap();

    let (_, on_shift) = request(&app, "GET", "/specialists/on-shift", None).await;
    assert_eq!(on_shift.as_array().unwrap().len(), 0);

    let mut feed_rx = watch(&hub, Topic::SpecialistFeed(sid));
    let (_, patched) = request(
        &app,
        "PATCH",
        &format!("/specialists/{sid}"),
        Some(json!({ "isOnShift": true, "lat": 55.75, "lng": 37.61 })),
    )
    .await;
    assert_eq!(patched["isOnShift"], true);
    assert!(!patched["lastShiftStartedAt"].is_null());

    let entity = feed_rx.recv().await.unwrap().entity.unwrap();
    assert_eq!(entity["isOnShift"], true);

    let (_, on_shift) = request(&app, "GET", "/specialists/on-shift", None).await;
    assert_eq!(on_shift.as_array().unwrap().len(), 1);
}
