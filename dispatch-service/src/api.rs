use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use shared::*;

use crate::gateway::MutationGateway;
use crate::hub::BroadcastHub;
use crate::store::EntityStore;
use crate::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub hub: Arc<BroadcastHub>,
    pub gateway: Arc<MutationGateway>,
}

impl AppState {
    pub fn new(store: Arc<dyn EntityStore>, hub: Arc<BroadcastHub>) -> Self {
        let gateway = Arc::new(MutationGateway::new(store.clone(), hub.clone()));
        AppState { store, hub, gateway }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SyncError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SyncError::NotFound { .. } => StatusCode::NOT_FOUND,
            SyncError::Store(_) | SyncError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order).patch(patch_order))
        .route("/specialists", post(create_specialist).get(list_specialists))
        .route("/specialists/on-shift", get(list_specialists_on_shift))
        .route(
            "/specialists/:id",
            get(get_specialist).patch(patch_specialist),
        )
        .route("/chat/send", post(send_chat))
        .route("/chat/order/:id", get(order_chat_history))
        .route("/chat/specialist/:id", get(specialist_chat_history))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrder>,
) -> ApiResult<Order> {
    Ok(Json(state.gateway.create_order(req).await?))
}

async fn patch_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<OrderPatch>,
) -> ApiResult<Order> {
    Ok(Json(state.gateway.patch_order(id, patch).await?))
}

async fn get_order(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Order> {
    Ok(Json(state.store.get_order(id).await?))
}

async fn list_orders(State(state): State<AppState>) -> ApiResult<Vec<Order>> {
    Ok(Json(state.store.list_orders().await?))
}

async fn create_specialist(
    State(state): State<AppState>,
    Json(req): Json<RegisterSpecialist>,
) -> ApiResult<Specialist> {
    Ok(Json(state.gateway.create_specialist(req).await?))
}

async fn patch_specialist(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<SpecialistPatch>,
) -> ApiResult<Specialist> {
    Ok(Json(state.gateway.patch_specialist(id, patch).await?))
}

/// Specialist row joined with its order history and the at-most-one active
/// order, both derived at read time.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialistDetail {
    #[serde(flatten)]
    pub specialist: Specialist,
    pub orders: Vec<Order>,
    pub active_order: Option<Order>,
}

async fn get_specialist(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<SpecialistDetail> {
    let specialist = state.store.get_specialist(id).await?;
    let orders = state.store.order_history(id).await?;
    let active_order = state.store.active_order(id).await?;
    Ok(Json(SpecialistDetail {
        specialist,
        orders,
        active_order,
    }))
}

async fn list_specialists(State(state): State<AppState>) -> ApiResult<Vec<Specialist>> {
    Ok(Json(state.store.list_specialists().await?))
}

async fn list_specialists_on_shift(State(state): State<AppState>) -> ApiResult<Vec<Specialist>> {
    Ok(Json(state.store.list_specialists_on_shift().await?))
}

async fn send_chat(
    State(state): State<AppState>,
    Json(req): Json<SendChat>,
) -> ApiResult<ChatMessage> {
    Ok(Json(state.gateway.send_chat(req).await?))
}

async fn order_chat_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<ChatMessage>> {
    Ok(Json(
        state.store.list_chat_messages(ChatThread::Order(id)).await?,
    ))
}

async fn specialist_chat_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<ChatMessage>> {
    Ok(Json(
        state
            .store
            .list_chat_messages(ChatThread::Specialist(id))
            .await?,
    ))
}

async fn health_check() -> &'static str {
    "OK"
}
