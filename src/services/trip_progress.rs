//! Trip lifecycle and GPS-driven stop progression.
//!
//! The TripStore is the sole source of truth: every evaluation re-reads
//! the trip and its stop events, so the automatic (GPS), simulated, and
//! manual paths all flow through the same guarded transition and the
//! first writer wins. An illegal transition is a silent no-op, never an
//! error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{ActiveTrip, GeoPoint, Stop, StopEvent, StopEventUpdate, StopStatus};
use crate::ports::{RealtimeNotifier, RepositoryError, RouteStopRepository, TripStore};
use crate::services::geo;

/// Identical (stop, target-status) automatic transitions are suppressed
/// inside this window to absorb GPS jitter and duplicate samples.
const DEBOUNCE_WINDOW: Duration = Duration::from_secs(30);

/// How far past a stop a simulated departure places the bus. Always
/// beyond the departure threshold ceiling.
const SIMULATED_DEPARTURE_OFFSET_M: f64 = 100.0;

/// Meters per degree of latitude, for synthesizing offsets.
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

#[derive(Debug, Error)]
pub enum TripError {
    #[error("bus {0} already has an active trip")]
    AlreadyActive(Uuid),

    #[error("trip {0} not found")]
    TripNotFound(Uuid),

    #[error("route {0} not found or has no stops")]
    EmptyRoute(Uuid),

    #[error("stop {0} has no event on this trip")]
    StopNotFound(Uuid),

    #[error("invalid coordinates")]
    InvalidCoordinates,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct TripProgressEngine {
    routes: Arc<dyn RouteStopRepository>,
    trips: Arc<dyn TripStore>,
    realtime: Arc<dyn RealtimeNotifier>,
    bus_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    trip_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    debounce: Mutex<TransitionDebounce>,
}

impl TripProgressEngine {
    pub fn new(
        routes: Arc<dyn RouteStopRepository>,
        trips: Arc<dyn TripStore>,
        realtime: Arc<dyn RealtimeNotifier>,
    ) -> Self {
        Self {
            routes,
            trips,
            realtime,
            bus_locks: Mutex::new(HashMap::new()),
            trip_locks: Mutex::new(HashMap::new()),
            debounce: Mutex::new(TransitionDebounce::new(DEBOUNCE_WINDOW)),
        }
    }

    /// Start a trip for a bus, creating one pending stop event per route
    /// stop. Rejects when the bus already has an active trip.
    pub async fn start_trip(
        &self,
        bus_id: Uuid,
        driver_id: Uuid,
        route_id: Uuid,
    ) -> Result<ActiveTrip, TripError> {
        let lock = acquire(&self.bus_locks, bus_id).await;
        let _guard = lock.lock().await;

        if self.trips.get_active_trip_for_bus(bus_id).await?.is_some() {
            return Err(TripError::AlreadyActive(bus_id));
        }

        let stops = self.routes.list_stops_for_route(route_id).await?;
        if stops.is_empty() {
            return Err(TripError::EmptyRoute(route_id));
        }

        let trip = ActiveTrip::start(bus_id, driver_id, route_id);
        self.trips.create_active_trip(&trip).await?;

        let events: Vec<StopEvent> = stops
            .iter()
            .map(|stop| StopEvent::pending(trip.id, stop))
            .collect();
        self.trips.create_stop_events(&events).await?;

        tracing::info!(trip = %trip.id, bus = %bus_id, route = %route_id, "trip started");
        Ok(trip)
    }

    /// End a trip. Idempotent: ending an already-ended trip is a no-op.
    /// Position samples arriving after this are ignored.
    pub async fn end_trip(&self, trip_id: Uuid) -> Result<(), TripError> {
        let lock = acquire(&self.trip_locks, trip_id).await;
        let _guard = lock.lock().await;

        let trip = self
            .trips
            .get_trip(trip_id)
            .await?
            .ok_or(TripError::TripNotFound(trip_id))?;

        if trip.active {
            self.trips.end_active_trip(trip_id, Utc::now()).await?;
            tracing::info!(trip = %trip_id, "trip ended");
        }
        self.debounce.lock().await.forget_trip(trip_id);
        Ok(())
    }

    /// Evaluate a live GPS sample against the trip's stop events.
    /// Returns the applied transition, if any.
    pub async fn report_position(
        &self,
        trip_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<StopEventUpdate>, TripError> {
        if !geo::is_valid_coordinate(latitude, longitude) {
            return Err(TripError::InvalidCoordinates);
        }

        let lock = acquire(&self.trip_locks, trip_id).await;
        let _guard = lock.lock().await;

        let Some(trip) = self.active_trip(trip_id).await? else {
            return Ok(None);
        };
        self.evaluate_sample(
            &trip,
            GeoPoint {
                latitude,
                longitude,
            },
        )
        .await
    }

    /// Operator-driven advance for a specific stop, used when the stop is
    /// unlocated or GPS is unavailable. Applies the same ordering rules
    /// as the automatic path; an illegal transition is ignored.
    pub async fn manual_advance(
        &self,
        trip_id: Uuid,
        stop_id: Uuid,
        target: StopStatus,
    ) -> Result<Option<StopEventUpdate>, TripError> {
        if target == StopStatus::Pending {
            return Ok(None);
        }

        let lock = acquire(&self.trip_locks, trip_id).await;
        let _guard = lock.lock().await;

        let Some(trip) = self.active_trip(trip_id).await? else {
            return Ok(None);
        };

        let events = self.trips.list_stop_events(trip.id).await?;
        let event = events
            .iter()
            .find(|ev| ev.stop_id == stop_id)
            .ok_or(TripError::StopNotFound(stop_id))?;

        let legal = match target {
            StopStatus::Arrived => {
                event.status == StopStatus::Pending
                    && events
                        .iter()
                        .filter(|ev| ev.sequence < event.sequence)
                        .all(|ev| ev.status == StopStatus::Departed)
            }
            StopStatus::Departed => event.status == StopStatus::Arrived,
            StopStatus::Pending => false,
        };
        if !legal {
            tracing::debug!(trip = %trip_id, stop = %stop_id, ?target, "manual advance ignored");
            return Ok(None);
        }

        Ok(Some(self.apply_transition(&trip, event, target).await?))
    }

    /// Dry-run of the automatic path: synthesizes a sample at the stop's
    /// coordinate instead of reading a sensor.
    pub async fn simulate_position(
        &self,
        trip_id: Uuid,
        stop_id: Uuid,
    ) -> Result<Option<StopEventUpdate>, TripError> {
        self.simulate(trip_id, stop_id, 0.0).await
    }

    /// Dry-run departure: synthesizes a sample just past the stop.
    pub async fn simulate_departure(
        &self,
        trip_id: Uuid,
        stop_id: Uuid,
    ) -> Result<Option<StopEventUpdate>, TripError> {
        self.simulate(trip_id, stop_id, SIMULATED_DEPARTURE_OFFSET_M)
            .await
    }

    async fn simulate(
        &self,
        trip_id: Uuid,
        stop_id: Uuid,
        offset_north_m: f64,
    ) -> Result<Option<StopEventUpdate>, TripError> {
        let lock = acquire(&self.trip_locks, trip_id).await;
        let _guard = lock.lock().await;

        let Some(trip) = self.active_trip(trip_id).await? else {
            return Ok(None);
        };

        let stops = self.routes.list_stops_for_route(trip.route_id).await?;
        let Some(location) = stops
            .iter()
            .find(|stop| stop.id == stop_id)
            .and_then(|stop| stop.location)
        else {
            // Unlocated stops cannot be simulated, same as they cannot be
            // advanced automatically.
            return Ok(None);
        };

        let sample = GeoPoint {
            latitude: location.latitude + offset_north_m / METERS_PER_DEGREE_LAT,
            longitude: location.longitude,
        };
        self.evaluate_sample(&trip, sample).await
    }

    /// Current stop events for a trip, ordered by sequence.
    pub async fn progress(&self, trip_id: Uuid) -> Result<Vec<StopEvent>, TripError> {
        if self.trips.get_trip(trip_id).await?.is_none() {
            return Err(TripError::TripNotFound(trip_id));
        }
        Ok(self.trips.list_stop_events(trip_id).await?)
    }

    async fn active_trip(&self, trip_id: Uuid) -> Result<Option<ActiveTrip>, TripError> {
        let trip = self
            .trips
            .get_trip(trip_id)
            .await?
            .ok_or(TripError::TripNotFound(trip_id))?;
        Ok(trip.active.then_some(trip))
    }

    /// Core of the automatic path. Only the first non-departed stop can
    /// transition (later stops need it departed first), so at most one
    /// transition is applied per sample.
    async fn evaluate_sample(
        &self,
        trip: &ActiveTrip,
        sample: GeoPoint,
    ) -> Result<Option<StopEventUpdate>, TripError> {
        let events = self.trips.list_stop_events(trip.id).await?;
        let stops = self.routes.list_stops_for_route(trip.route_id).await?;
        let by_id: HashMap<Uuid, &Stop> = stops.iter().map(|s| (s.id, s)).collect();

        let Some(event) = events
            .iter()
            .find(|ev| ev.status != StopStatus::Departed)
        else {
            return Ok(None);
        };

        // Unlocated stops hold the line until a manual command moves them.
        let Some(location) = by_id.get(&event.stop_id).and_then(|s| s.location) else {
            return Ok(None);
        };

        let distance = geo::distance_between(&sample, &location);

        match event.status {
            StopStatus::Pending => {
                if distance <= geo::ARRIVAL_RADIUS_METERS
                    && self
                        .debounce_permits(trip.id, event.stop_id, StopStatus::Arrived)
                        .await
                {
                    return Ok(Some(
                        self.apply_transition(trip, event, StopStatus::Arrived).await?,
                    ));
                }
                Ok(None)
            }
            StopStatus::Arrived => {
                let next_location = stops
                    .iter()
                    .filter(|s| s.sequence > event.sequence)
                    .filter(|s| s.location.is_some())
                    .min_by_key(|s| s.sequence)
                    .and_then(|s| s.location);
                let threshold = geo::departure_threshold(&location, next_location.as_ref());

                if distance > threshold
                    && self
                        .debounce_permits(trip.id, event.stop_id, StopStatus::Departed)
                        .await
                {
                    return Ok(Some(
                        self.apply_transition(trip, event, StopStatus::Departed).await?,
                    ));
                }
                Ok(None)
            }
            StopStatus::Departed => Ok(None),
        }
    }

    async fn apply_transition(
        &self,
        trip: &ActiveTrip,
        event: &StopEvent,
        target: StopStatus,
    ) -> Result<StopEventUpdate, TripError> {
        let now = Utc::now();
        self.trips.update_stop_event(event.id, target, now).await?;
        if target == StopStatus::Departed {
            self.trips
                .set_current_stop_sequence(trip.id, event.sequence)
                .await?;
        }

        self.debounce
            .lock()
            .await
            .arm((trip.id, event.stop_id, target), Instant::now());

        let update = StopEventUpdate {
            trip_id: trip.id,
            stop_id: event.stop_id,
            sequence: event.sequence,
            status: target,
            timestamp: now,
        };
        tracing::info!(
            trip = %trip.id,
            stop = %event.stop_id,
            sequence = event.sequence,
            status = target.as_str(),
            "stop transition"
        );
        self.realtime.publish(update.clone());
        Ok(update)
    }

    async fn debounce_permits(&self, trip_id: Uuid, stop_id: Uuid, target: StopStatus) -> bool {
        self.debounce
            .lock()
            .await
            .permits((trip_id, stop_id, target), Instant::now())
    }
}

async fn acquire(
    locks: &Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    key: Uuid,
) -> Arc<Mutex<()>> {
    locks.lock().await.entry(key).or_default().clone()
}

type TransitionKey = (Uuid, Uuid, StopStatus);

/// Suppresses re-application of an identical automatic transition inside
/// a fixed window. Manual commands bypass the check but still arm it.
struct TransitionDebounce {
    window: Duration,
    applied: HashMap<TransitionKey, Instant>,
}

impl TransitionDebounce {
    fn new(window: Duration) -> Self {
        Self {
            window,
            applied: HashMap::new(),
        }
    }

    fn permits(&self, key: TransitionKey, now: Instant) -> bool {
        match self.applied.get(&key) {
            Some(&at) => now.duration_since(at) >= self.window,
            None => true,
        }
    }

    fn arm(&mut self, key: TransitionKey, now: Instant) {
        self.applied.insert(key, now);
    }

    fn forget_trip(&mut self, trip_id: Uuid) {
        self.applied.retain(|(trip, _, _), _| *trip != trip_id);
    }
}
