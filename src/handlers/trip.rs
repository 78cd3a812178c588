use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::domain::{StopEventUpdate, StopStatus};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct StartTripRequest {
    pub bus_id: Uuid,
    pub driver_id: Uuid,
    pub route_id: Uuid,
}

pub async fn start_trip(
    State(state): State<AppState>,
    Json(req): Json<StartTripRequest>,
) -> Result<impl IntoResponse, AppError> {
    let trip = state
        .trips
        .start_trip(req.bus_id, req.driver_id, req.route_id)
        .await?;

    Ok((StatusCode::CREATED, Json(trip)))
}

pub async fn end_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.trips.end_trip(trip_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
}

/// Whether a command produced a stop transition. Commands that could not
/// legally transition anything are reported as not applied, never as
/// errors.
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<StopEventUpdate>,
}

impl From<Option<StopEventUpdate>> for TransitionResponse {
    fn from(transition: Option<StopEventUpdate>) -> Self {
        Self {
            applied: transition.is_some(),
            transition,
        }
    }
}

pub async fn report_position(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(sample): Json<PositionSample>,
) -> Result<impl IntoResponse, AppError> {
    let transition = state
        .trips
        .report_position(trip_id, sample.latitude, sample.longitude)
        .await?;

    Ok(Json(TransitionResponse::from(transition)))
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub target: StopStatus,
}

pub async fn manual_advance(
    State(state): State<AppState>,
    Path((trip_id, stop_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AdvanceRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.target == StopStatus::Pending {
        return Err(AppError::Validation(
            "target must be arrived or departed".to_string(),
        ));
    }

    let transition = state
        .trips
        .manual_advance(trip_id, stop_id, req.target)
        .await?;

    Ok(Json(TransitionResponse::from(transition)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatePhase {
    Arrival,
    Departure,
}

#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    pub phase: SimulatePhase,
}

/// Dry-run of the GPS path against a stop's recorded coordinate.
pub async fn simulate(
    State(state): State<AppState>,
    Path((trip_id, stop_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SimulateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transition = match req.phase {
        SimulatePhase::Arrival => state.trips.simulate_position(trip_id, stop_id).await?,
        SimulatePhase::Departure => state.trips.simulate_departure(trip_id, stop_id).await?,
    };

    Ok(Json(TransitionResponse::from(transition)))
}

pub async fn progress(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let events = state.trips.progress(trip_id).await?;
    Ok(Json(events))
}
