use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;
use crate::ports::RouteStopRepository;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// Opaque string decoded from the scanned QR code.
    pub pass_code: String,
    pub bus_id: Uuid,
    pub driver_id: Uuid,
    pub route_id: Uuid,
}

/// Process a boarding scan. Domain outcomes (blocked, limit exceeded,
/// insufficient balance, unknown pass) are part of the 200 response body;
/// only infrastructure failures surface as HTTP errors.
pub async fn process_scan(
    State(state): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> Result<impl IntoResponse, AppError> {
    let route = state
        .routes
        .get_route(req.route_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("route {}", req.route_id)))?;

    let outcome = state
        .scans
        .process_scan(&req.pass_code, req.bus_id, req.driver_id, &route.daily_fare)
        .await?;

    Ok(Json(outcome))
}
