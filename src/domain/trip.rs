//! Route, trip, and stop-progress domain types.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A geographic coordinate. Stops may lack one ("unlocated stop"), in
/// which case they are only ever advanced manually.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub id: Uuid,
    pub name: String,
    pub daily_fare: BigDecimal,
}

/// A fixed point along a route. Sequence indices are 1-based, contiguous
/// and unique within the route.
#[derive(Debug, Clone, Serialize)]
pub struct Stop {
    pub id: Uuid,
    pub route_id: Uuid,
    pub name: String,
    pub sequence: i32,
    pub location: Option<GeoPoint>,
}

/// One traversal of a route by a bus/driver pair.
///
/// At most one trip per bus may be active at a time; ending a trip clears
/// the active flag and implicitly retires its stop events.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveTrip {
    pub id: Uuid,
    pub bus_id: Uuid,
    pub driver_id: Uuid,
    pub route_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active: bool,
    /// Sequence index of the last departed stop; 0 before any departure.
    pub current_stop_sequence: i32,
}

impl ActiveTrip {
    pub fn start(bus_id: Uuid, driver_id: Uuid, route_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            bus_id,
            driver_id,
            route_id,
            started_at: Utc::now(),
            ended_at: None,
            active: true,
            current_stop_sequence: 0,
        }
    }
}

/// Per-stop progress within a trip. Transitions only move forward:
/// pending -> arrived -> departed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Pending,
    Arrived,
    Departed,
}

impl StopStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopStatus::Pending => "pending",
            StopStatus::Arrived => "arrived",
            StopStatus::Departed => "departed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StopEvent {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub stop_id: Uuid,
    pub sequence: i32,
    pub status: StopStatus,
    pub arrived_at: Option<DateTime<Utc>>,
    pub departed_at: Option<DateTime<Utc>>,
}

impl StopEvent {
    pub fn pending(trip_id: Uuid, stop: &Stop) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            stop_id: stop.id,
            sequence: stop.sequence,
            status: StopStatus::Pending,
            arrived_at: None,
            departed_at: None,
        }
    }
}

/// Payload pushed to route viewers on every stop transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopEventUpdate {
    pub trip_id: Uuid,
    pub stop_id: Uuid,
    pub sequence: i32,
    pub status: StopStatus,
    pub timestamp: DateTime<Utc>,
}
