pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod services;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::ports::{
    LedgerWriter, Notifier, RouteStopRepository, ScanLogWriter, StudentRepository, TripStore,
};
use crate::services::{FareScanProcessor, ProgressBroadcast, TripProgressEngine};

#[derive(Clone)]
pub struct AppState {
    pub scans: Arc<FareScanProcessor>,
    pub trips: Arc<TripProgressEngine>,
    pub routes: Arc<dyn RouteStopRepository>,
    pub realtime: Arc<ProgressBroadcast>,
}

impl AppState {
    /// Wire the services against a single store implementing every
    /// storage port (the Postgres or in-memory adapter).
    pub fn from_store<S>(
        store: Arc<S>,
        notifier: Arc<dyn Notifier>,
        realtime: Arc<ProgressBroadcast>,
    ) -> Self
    where
        S: StudentRepository
            + ScanLogWriter
            + LedgerWriter
            + RouteStopRepository
            + TripStore
            + 'static,
    {
        let scans = Arc::new(FareScanProcessor::new(
            store.clone(),
            store.clone(),
            store.clone(),
            notifier,
        ));
        let trips = Arc::new(TripProgressEngine::new(
            store.clone(),
            store.clone(),
            realtime.clone(),
        ));
        Self {
            scans,
            trips,
            routes: store,
            realtime,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/scans", post(handlers::scan::process_scan))
        .route("/trips", post(handlers::trip::start_trip))
        .route("/trips/:id/end", post(handlers::trip::end_trip))
        .route("/trips/:id/position", post(handlers::trip::report_position))
        .route("/trips/:id/progress", get(handlers::trip::progress))
        .route("/trips/:id/progress/ws", get(handlers::ws::progress_ws))
        .route(
            "/trips/:id/stops/:stop_id/advance",
            post(handlers::trip::manual_advance),
        )
        .route(
            "/trips/:id/stops/:stop_id/simulate",
            post(handlers::trip::simulate),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
