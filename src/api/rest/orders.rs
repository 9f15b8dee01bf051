use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, patch, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::queue::enqueue_dispatch;
use crate::error::AppError;
use crate::lifecycle::NewOrder;
use crate::models::order::{DeliveryLocation, LineItem, Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/accept", post(accept_order))
        .route("/orders/:id/status", patch(advance_order))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<LineItem>,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub total_amount: i64,
    pub user_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
    pub reason: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOrderRequest {
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceOrderRequest {
    pub expected: OrderStatus,
    pub next: OrderStatus,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    state
        .identities
        .authorize_customer(auth_header, payload.user_id)?;

    let order = state
        .lifecycle
        .create(NewOrder {
            customer_id: payload.user_id,
            items: payload.items,
            total_amount: payload.total_amount,
            delivery_location: DeliveryLocation {
                lat: payload.lat,
                lng: payload.lng,
                address: payload.address,
            },
        })
        .await?;

    // Fire-and-forget: a failed hand-off leaves the order observable as
    // unassigned, it never fails the creation response.
    enqueue_dispatch(&state, order.id);

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse { order_id: order.id }),
    ))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.lifecycle.get(id).await?))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelOrderRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.lifecycle.cancel(id, payload.reason).await?))
}

/// Manual driver acceptance. Races against the dispatch engine and other
/// drivers; losers get 409 "order no longer available".
async fn accept_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptOrderRequest>,
) -> Result<Json<Order>, AppError> {
    let driver = state.registry.get(payload.driver_id)?;
    let result = state
        .lifecycle
        .assign_driver(id, driver.id, driver.name)
        .await?;

    if result.newly_assigned {
        state.registry.increment_load(driver.id);
    }

    Ok(Json(result.order))
}

async fn advance_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceOrderRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(
        state
            .lifecycle
            .transition(id, payload.expected, payload.next)
            .await?,
    ))
}
