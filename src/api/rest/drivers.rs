use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{patch, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Driver, GeoPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/location", patch(report_location))
        .route("/drivers/:id/online", patch(set_online))
        .route("/drivers/:id/deactivate", post(deactivate_driver))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDriverRequest {
    pub name: String,
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLocationRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetOnlineRequest {
    pub online: bool,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    let driver = state.registry.register(payload.name, payload.location);
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    Json(state.registry.all())
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(state.registry.report_location(
        id,
        payload.lat,
        payload.lng,
    )?))
}

async fn set_online(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetOnlineRequest>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(state.registry.set_online(id, payload.online)?))
}

async fn deactivate_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(state.registry.deactivate(id)?))
}
