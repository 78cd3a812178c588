//! Trip lifecycle and stop-progression scenarios against the in-memory
//! store. Coordinates use ~111,195 m per degree of latitude, so 0.00045°
//! is ~50 m.

use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use tokio::time::timeout;
use uuid::Uuid;

use transit_core::adapters::MemoryStore;
use transit_core::domain::{GeoPoint, Route, Stop, StopStatus};
use transit_core::ports::{RealtimeNotifier, TripStore};
use transit_core::services::trip_progress::TripError;
use transit_core::services::{ProgressBroadcast, TripProgressEngine};

const BASE_LAT: f64 = 33.6500;
const BASE_LON: f64 = -117.7300;

/// Degrees of latitude for a northward offset in meters.
fn north(meters: f64) -> f64 {
    meters / 111_195.0
}

struct Fixture {
    store: Arc<MemoryStore>,
    realtime: Arc<ProgressBroadcast>,
    engine: TripProgressEngine,
    route_id: Uuid,
    stops: Vec<Stop>,
}

fn stop(route_id: Uuid, name: &str, sequence: i32, location: Option<GeoPoint>) -> Stop {
    Stop {
        id: Uuid::new_v4(),
        route_id,
        name: name.to_string(),
        sequence,
        location,
    }
}

fn point(lat_offset_m: f64) -> GeoPoint {
    GeoPoint {
        latitude: BASE_LAT + north(lat_offset_m),
        longitude: BASE_LON,
    }
}

/// Two located stops, 500 m apart.
async fn located_route() -> Fixture {
    let route_id = Uuid::new_v4();
    let stops = vec![
        stop(route_id, "Library", 1, Some(point(0.0))),
        stop(route_id, "Stadium", 2, Some(point(500.0))),
    ];
    fixture_with(route_id, stops).await
}

/// Located, unlocated, located: 1 km between the located pair.
async fn mixed_route() -> Fixture {
    let route_id = Uuid::new_v4();
    let stops = vec![
        stop(route_id, "Library", 1, Some(point(0.0))),
        stop(route_id, "Old Gate", 2, None),
        stop(route_id, "Stadium", 3, Some(point(1000.0))),
    ];
    fixture_with(route_id, stops).await
}

async fn fixture_with(route_id: Uuid, stops: Vec<Stop>) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_route(
            Route {
                id: route_id,
                name: "Campus Loop".to_string(),
                daily_fare: BigDecimal::from(60),
            },
            stops.clone(),
        )
        .await;

    let realtime = Arc::new(ProgressBroadcast::new());
    let engine = TripProgressEngine::new(store.clone(), store.clone(), realtime.clone());
    Fixture {
        store,
        realtime,
        engine,
        route_id,
        stops,
    }
}

async fn statuses(fx: &Fixture, trip_id: Uuid) -> Vec<StopStatus> {
    fx.engine
        .progress(trip_id)
        .await
        .expect("progress")
        .iter()
        .map(|ev| ev.status)
        .collect()
}

#[tokio::test]
async fn starting_a_trip_creates_pending_events() {
    let fx = located_route().await;
    let trip = fx
        .engine
        .start_trip(Uuid::new_v4(), Uuid::new_v4(), fx.route_id)
        .await
        .expect("start");

    assert!(trip.active);
    assert_eq!(trip.current_stop_sequence, 0);
    assert_eq!(
        statuses(&fx, trip.id).await,
        vec![StopStatus::Pending, StopStatus::Pending]
    );
}

#[tokio::test]
async fn second_start_for_the_same_bus_is_rejected() {
    let fx = located_route().await;
    let bus_id = Uuid::new_v4();

    fx.engine
        .start_trip(bus_id, Uuid::new_v4(), fx.route_id)
        .await
        .expect("first start");

    let err = fx
        .engine
        .start_trip(bus_id, Uuid::new_v4(), fx.route_id)
        .await
        .expect_err("second start must fail");
    assert!(matches!(err, TripError::AlreadyActive(id) if id == bus_id));
}

#[tokio::test]
async fn gps_samples_walk_the_route() {
    let fx = located_route().await;
    let trip = fx
        .engine
        .start_trip(Uuid::new_v4(), Uuid::new_v4(), fx.route_id)
        .await
        .expect("start");

    // At the first stop: arrive.
    let update = fx
        .engine
        .report_position(trip.id, BASE_LAT, BASE_LON)
        .await
        .expect("sample")
        .expect("transition");
    assert_eq!(update.status, StopStatus::Arrived);
    assert_eq!(update.sequence, 1);

    // Still at the stop: nothing else may transition this sample.
    let none = fx
        .engine
        .report_position(trip.id, BASE_LAT, BASE_LON)
        .await
        .expect("sample");
    assert!(none.is_none());

    // 90 m past the stop, beyond the 80 m threshold: depart.
    let update = fx
        .engine
        .report_position(trip.id, BASE_LAT + north(90.0), BASE_LON)
        .await
        .expect("sample")
        .expect("transition");
    assert_eq!(update.status, StopStatus::Departed);
    assert_eq!(update.sequence, 1);

    let trip_row = fx
        .engine
        .progress(trip.id)
        .await
        .expect("progress");
    assert_eq!(trip_row[0].status, StopStatus::Departed);
    assert!(trip_row[0].arrived_at.is_some());
    assert!(trip_row[0].departed_at.is_some());

    // At the second stop: arrive.
    let update = fx
        .engine
        .report_position(trip.id, BASE_LAT + north(500.0), BASE_LON)
        .await
        .expect("sample")
        .expect("transition");
    assert_eq!(update.status, StopStatus::Arrived);
    assert_eq!(update.sequence, 2);

    assert_eq!(
        statuses(&fx, trip.id).await,
        vec![StopStatus::Departed, StopStatus::Arrived]
    );
}

#[tokio::test]
async fn far_samples_do_not_arrive() {
    let fx = located_route().await;
    let trip = fx
        .engine
        .start_trip(Uuid::new_v4(), Uuid::new_v4(), fx.route_id)
        .await
        .expect("start");

    // 60 m out: outside the 50 m arrival radius.
    let none = fx
        .engine
        .report_position(trip.id, BASE_LAT + north(60.0), BASE_LON)
        .await
        .expect("sample");
    assert!(none.is_none());
}

#[tokio::test]
async fn out_of_order_manual_advance_is_ignored() {
    let fx = located_route().await;
    let trip = fx
        .engine
        .start_trip(Uuid::new_v4(), Uuid::new_v4(), fx.route_id)
        .await
        .expect("start");
    let second_stop = fx.stops[1].id;

    // The first stop has not departed, so the second may not arrive.
    let result = fx
        .engine
        .manual_advance(trip.id, second_stop, StopStatus::Arrived)
        .await
        .expect("manual advance");
    assert!(result.is_none());

    assert_eq!(
        statuses(&fx, trip.id).await,
        vec![StopStatus::Pending, StopStatus::Pending]
    );
}

#[tokio::test]
async fn departing_requires_arrival_first() {
    let fx = located_route().await;
    let trip = fx
        .engine
        .start_trip(Uuid::new_v4(), Uuid::new_v4(), fx.route_id)
        .await
        .expect("start");
    let first_stop = fx.stops[0].id;

    let result = fx
        .engine
        .manual_advance(trip.id, first_stop, StopStatus::Departed)
        .await
        .expect("manual advance");
    assert!(result.is_none());
}

#[tokio::test]
async fn unlocated_stops_hold_until_manually_advanced() {
    let fx = mixed_route().await;
    let trip = fx
        .engine
        .start_trip(Uuid::new_v4(), Uuid::new_v4(), fx.route_id)
        .await
        .expect("start");
    let gate = fx.stops[1].id;

    // Walk the first stop.
    fx.engine
        .report_position(trip.id, BASE_LAT, BASE_LON)
        .await
        .expect("sample");
    fx.engine
        .report_position(trip.id, BASE_LAT + north(90.0), BASE_LON)
        .await
        .expect("sample");

    // A sample at the third stop cannot advance the unlocated second.
    let none = fx
        .engine
        .report_position(trip.id, BASE_LAT + north(1000.0), BASE_LON)
        .await
        .expect("sample");
    assert!(none.is_none());

    // Manual commands move it through.
    let arrived = fx
        .engine
        .manual_advance(trip.id, gate, StopStatus::Arrived)
        .await
        .expect("manual")
        .expect("transition");
    assert_eq!(arrived.status, StopStatus::Arrived);

    let departed = fx
        .engine
        .manual_advance(trip.id, gate, StopStatus::Departed)
        .await
        .expect("manual")
        .expect("transition");
    assert_eq!(departed.status, StopStatus::Departed);

    let trip_after = fx
        .store
        .get_trip(trip.id)
        .await
        .expect("get trip")
        .expect("trip exists");
    assert_eq!(trip_after.current_stop_sequence, 2);

    // Now the third stop can arrive automatically.
    let update = fx
        .engine
        .report_position(trip.id, BASE_LAT + north(1000.0), BASE_LON)
        .await
        .expect("sample")
        .expect("transition");
    assert_eq!(update.status, StopStatus::Arrived);
    assert_eq!(update.sequence, 3);
}

#[tokio::test]
async fn simulated_samples_follow_the_automatic_rules() {
    let fx = located_route().await;
    let trip = fx
        .engine
        .start_trip(Uuid::new_v4(), Uuid::new_v4(), fx.route_id)
        .await
        .expect("start");
    let (first, second) = (fx.stops[0].id, fx.stops[1].id);

    let arrived = fx
        .engine
        .simulate_position(trip.id, first)
        .await
        .expect("simulate")
        .expect("transition");
    assert_eq!(arrived.status, StopStatus::Arrived);

    let departed = fx
        .engine
        .simulate_departure(trip.id, first)
        .await
        .expect("simulate")
        .expect("transition");
    assert_eq!(departed.status, StopStatus::Departed);

    let arrived = fx
        .engine
        .simulate_position(trip.id, second)
        .await
        .expect("simulate")
        .expect("transition");
    assert_eq!(arrived.status, StopStatus::Arrived);
    assert_eq!(arrived.sequence, 2);

    // Simulating the second stop while the first was pending would have
    // been a no-op: the synthesized sample is nowhere near the first.
}

#[tokio::test]
async fn ending_a_trip_is_idempotent_and_stops_samples() {
    let fx = located_route().await;
    let trip = fx
        .engine
        .start_trip(Uuid::new_v4(), Uuid::new_v4(), fx.route_id)
        .await
        .expect("start");

    fx.engine.end_trip(trip.id).await.expect("end");
    fx.engine.end_trip(trip.id).await.expect("end again");

    // Samples for an ended trip are ignored, not errors.
    let none = fx
        .engine
        .report_position(trip.id, BASE_LAT, BASE_LON)
        .await
        .expect("sample");
    assert!(none.is_none());
    assert_eq!(
        statuses(&fx, trip.id).await,
        vec![StopStatus::Pending, StopStatus::Pending]
    );
}

#[tokio::test]
async fn invalid_coordinates_are_rejected() {
    let fx = located_route().await;
    let trip = fx
        .engine
        .start_trip(Uuid::new_v4(), Uuid::new_v4(), fx.route_id)
        .await
        .expect("start");

    let err = fx
        .engine
        .report_position(trip.id, f64::NAN, BASE_LON)
        .await
        .expect_err("NaN latitude must be rejected");
    assert!(matches!(err, TripError::InvalidCoordinates));

    let err = fx
        .engine
        .report_position(trip.id, 91.0, BASE_LON)
        .await
        .expect_err("out-of-range latitude must be rejected");
    assert!(matches!(err, TripError::InvalidCoordinates));
}

#[tokio::test]
async fn unknown_trip_is_an_error() {
    let fx = located_route().await;
    let err = fx
        .engine
        .progress(Uuid::new_v4())
        .await
        .expect_err("unknown trip");
    assert!(matches!(err, TripError::TripNotFound(_)));
}

#[tokio::test]
async fn transitions_reach_subscribers() {
    let fx = located_route().await;
    let trip = fx
        .engine
        .start_trip(Uuid::new_v4(), Uuid::new_v4(), fx.route_id)
        .await
        .expect("start");

    let mut subscription = fx.realtime.subscribe(Some(trip.id));

    fx.engine
        .report_position(trip.id, BASE_LAT, BASE_LON)
        .await
        .expect("sample");
    fx.engine
        .report_position(trip.id, BASE_LAT + north(90.0), BASE_LON)
        .await
        .expect("sample");

    let first = timeout(Duration::from_secs(1), subscription.next())
        .await
        .expect("no update within timeout")
        .expect("update");
    assert_eq!(first.status, StopStatus::Arrived);
    assert_eq!(first.sequence, 1);

    let second = timeout(Duration::from_secs(1), subscription.next())
        .await
        .expect("no update within timeout")
        .expect("update");
    assert_eq!(second.status, StopStatus::Departed);
    assert_eq!(second.sequence, 1);
}
