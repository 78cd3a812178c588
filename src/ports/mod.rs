//! Collaborator ports consumed by the core services.
//!
//! Concrete bindings live in [`crate::adapters`]; the services only ever
//! see these traits. Implementations must be thread-safe (`Send + Sync`)
//! as they are called concurrently from many scan/position handlers.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    ActiveTrip, LedgerEntry, PassHolder, Route, ScanRecord, Stop, StopEvent, StopEventUpdate,
    StopStatus,
};
use crate::services::realtime::ProgressSubscription;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Transport/storage failure; retryable, distinct from domain outcomes.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".into()),
            other => RepositoryError::Storage(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Read/charge access to pass holders.
#[async_trait]
pub trait StudentRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Option<PassHolder>>;

    /// Atomically decrement the wallet balance and return the new value.
    /// Must refuse to drive the balance negative.
    async fn decrement_balance(&self, id: Uuid, amount: &BigDecimal)
        -> RepositoryResult<BigDecimal>;

    /// Number of `success` scan records for this holder since `since`.
    async fn count_successful_scans_since(
        &self,
        id: Uuid,
        since: DateTime<Utc>,
    ) -> RepositoryResult<i64>;
}

/// Append-only scan audit log.
#[async_trait]
pub trait ScanLogWriter: Send + Sync {
    async fn append(&self, record: &ScanRecord) -> RepositoryResult<()>;
}

/// Append-only wallet ledger.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    async fn append(&self, entry: &LedgerEntry) -> RepositoryResult<()>;
}

/// Best-effort outbound notifications. A failure here never fails the
/// operation that triggered it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_low_balance(&self, holder_id: Uuid, balance: &BigDecimal) -> anyhow::Result<()>;
}

/// Read access to routes and their ordered stops.
#[async_trait]
pub trait RouteStopRepository: Send + Sync {
    async fn get_route(&self, route_id: Uuid) -> RepositoryResult<Option<Route>>;

    /// Stops ordered by sequence, ascending.
    async fn list_stops_for_route(&self, route_id: Uuid) -> RepositoryResult<Vec<Stop>>;
}

/// Source of truth for active trips and their stop events.
#[async_trait]
pub trait TripStore: Send + Sync {
    async fn create_active_trip(&self, trip: &ActiveTrip) -> RepositoryResult<()>;

    /// Idempotent: ending an already-ended trip is a no-op.
    async fn end_active_trip(&self, trip_id: Uuid, ended_at: DateTime<Utc>)
        -> RepositoryResult<()>;

    async fn get_trip(&self, trip_id: Uuid) -> RepositoryResult<Option<ActiveTrip>>;

    async fn get_active_trip_for_bus(&self, bus_id: Uuid) -> RepositoryResult<Option<ActiveTrip>>;

    async fn create_stop_events(&self, events: &[StopEvent]) -> RepositoryResult<()>;

    /// Set the event's status and stamp the matching timestamp
    /// (arrived_at for `Arrived`, departed_at for `Departed`).
    async fn update_stop_event(
        &self,
        event_id: Uuid,
        status: StopStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    async fn set_current_stop_sequence(&self, trip_id: Uuid, sequence: i32)
        -> RepositoryResult<()>;

    /// Stop events ordered by sequence, ascending.
    async fn list_stop_events(&self, trip_id: Uuid) -> RepositoryResult<Vec<StopEvent>>;
}

/// Push channel for stop transitions, consumed by route viewers.
pub trait RealtimeNotifier: Send + Sync {
    fn publish(&self, update: StopEventUpdate);

    /// Subscribe to updates, optionally filtered to one trip. Dropping
    /// the returned handle cancels the subscription.
    fn subscribe(&self, trip_id: Option<Uuid>) -> ProgressSubscription;
}
