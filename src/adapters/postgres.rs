//! Postgres implementation of the storage ports.
//!
//! Row structs are private to the adapter and mapped into domain types;
//! nothing outside this module sees sqlx.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    ActiveTrip, GeoPoint, LedgerEntry, PassHolder, Route, ScanRecord, Stop, StopEvent, StopStatus,
};
use crate::ports::{
    LedgerWriter, RepositoryError, RepositoryResult, RouteStopRepository, ScanLogWriter,
    StudentRepository, TripStore,
};

/// Postgres-backed store implementing every storage port.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StudentRepository for PostgresStore {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Option<PassHolder>> {
        let row = sqlx::query_as::<_, PassHolderRow>(
            "SELECT id, name, wallet_balance, blocked, route_id, created_at \
             FROM pass_holders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.map(|r| r.into_domain()))
    }

    async fn decrement_balance(
        &self,
        id: Uuid,
        amount: &BigDecimal,
    ) -> RepositoryResult<BigDecimal> {
        // Conditional update keeps the balance non-negative even if a
        // concurrent writer slipped in between read and charge.
        let balance = sqlx::query_scalar::<_, BigDecimal>(
            "UPDATE pass_holders \
             SET wallet_balance = wallet_balance - $2 \
             WHERE id = $1 AND wallet_balance >= $2 \
             RETURNING wallet_balance",
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        balance.ok_or_else(|| {
            RepositoryError::Conflict(format!("holder {id} missing or balance below {amount}"))
        })
    }

    async fn count_successful_scans_since(
        &self,
        id: Uuid,
        since: DateTime<Utc>,
    ) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM scan_records \
             WHERE pass_holder_id = $1 AND status = 'success' AND scanned_at >= $2",
        )
        .bind(id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(count)
    }
}

#[async_trait]
impl ScanLogWriter for PostgresStore {
    async fn append(&self, record: &ScanRecord) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO scan_records \
             (id, pass_holder_id, bus_id, driver_id, scanned_at, status, fare_charged, balance_after) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.id)
        .bind(record.pass_holder_id)
        .bind(record.bus_id)
        .bind(record.driver_id)
        .bind(record.scanned_at)
        .bind(record.status.as_str())
        .bind(&record.fare_charged)
        .bind(&record.balance_after)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }
}

#[async_trait]
impl LedgerWriter for PostgresStore {
    async fn append(&self, entry: &LedgerEntry) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO ledger_entries \
             (id, pass_holder_id, amount, kind, balance_before, balance_after, description, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id)
        .bind(entry.pass_holder_id)
        .bind(&entry.amount)
        .bind(entry.kind.as_str())
        .bind(&entry.balance_before)
        .bind(&entry.balance_after)
        .bind(&entry.description)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }
}

#[async_trait]
impl RouteStopRepository for PostgresStore {
    async fn get_route(&self, route_id: Uuid) -> RepositoryResult<Option<Route>> {
        let row = sqlx::query_as::<_, RouteRow>(
            "SELECT id, name, daily_fare FROM routes WHERE id = $1",
        )
        .bind(route_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.map(|r| r.into_domain()))
    }

    async fn list_stops_for_route(&self, route_id: Uuid) -> RepositoryResult<Vec<Stop>> {
        let rows = sqlx::query_as::<_, StopRow>(
            "SELECT id, route_id, name, sequence, latitude, longitude \
             FROM stops WHERE route_id = $1 ORDER BY sequence ASC",
        )
        .bind(route_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }
}

#[async_trait]
impl TripStore for PostgresStore {
    async fn create_active_trip(&self, trip: &ActiveTrip) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO active_trips \
             (id, bus_id, driver_id, route_id, started_at, ended_at, active, current_stop_sequence) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(trip.id)
        .bind(trip.bus_id)
        .bind(trip.driver_id)
        .bind(trip.route_id)
        .bind(trip.started_at)
        .bind(trip.ended_at)
        .bind(trip.active)
        .bind(trip.current_stop_sequence)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn end_active_trip(
        &self,
        trip_id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        // The active guard makes this idempotent.
        sqlx::query(
            "UPDATE active_trips SET active = FALSE, ended_at = $2 \
             WHERE id = $1 AND active",
        )
        .bind(trip_id)
        .bind(ended_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn get_trip(&self, trip_id: Uuid) -> RepositoryResult<Option<ActiveTrip>> {
        let row = sqlx::query_as::<_, TripRow>(
            "SELECT id, bus_id, driver_id, route_id, started_at, ended_at, active, current_stop_sequence \
             FROM active_trips WHERE id = $1",
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.map(|r| r.into_domain()))
    }

    async fn get_active_trip_for_bus(
        &self,
        bus_id: Uuid,
    ) -> RepositoryResult<Option<ActiveTrip>> {
        let row = sqlx::query_as::<_, TripRow>(
            "SELECT id, bus_id, driver_id, route_id, started_at, ended_at, active, current_stop_sequence \
             FROM active_trips WHERE bus_id = $1 AND active",
        )
        .bind(bus_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.map(|r| r.into_domain()))
    }

    async fn create_stop_events(&self, events: &[StopEvent]) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        for event in events {
            sqlx::query(
                "INSERT INTO stop_events \
                 (id, trip_id, stop_id, sequence, status, arrived_at, departed_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(event.id)
            .bind(event.trip_id)
            .bind(event.stop_id)
            .bind(event.sequence)
            .bind(event.status.as_str())
            .bind(event.arrived_at)
            .bind(event.departed_at)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn update_stop_event(
        &self,
        event_id: Uuid,
        status: StopStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let query = match status {
            StopStatus::Arrived => {
                "UPDATE stop_events SET status = $2, arrived_at = $3 WHERE id = $1"
            }
            StopStatus::Departed => {
                "UPDATE stop_events SET status = $2, departed_at = $3 WHERE id = $1"
            }
            StopStatus::Pending => "UPDATE stop_events SET status = $2 WHERE id = $1",
        };

        sqlx::query(query)
            .bind(event_id)
            .bind(status.as_str())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn set_current_stop_sequence(
        &self,
        trip_id: Uuid,
        sequence: i32,
    ) -> RepositoryResult<()> {
        sqlx::query("UPDATE active_trips SET current_stop_sequence = $2 WHERE id = $1")
            .bind(trip_id)
            .bind(sequence)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn list_stop_events(&self, trip_id: Uuid) -> RepositoryResult<Vec<StopEvent>> {
        let rows = sqlx::query_as::<_, StopEventRow>(
            "SELECT id, trip_id, stop_id, sequence, status, arrived_at, departed_at \
             FROM stop_events WHERE trip_id = $1 ORDER BY sequence ASC",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PassHolderRow {
    id: Uuid,
    name: String,
    wallet_balance: BigDecimal,
    blocked: bool,
    route_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl PassHolderRow {
    fn into_domain(self) -> PassHolder {
        PassHolder {
            id: self.id,
            name: self.name,
            wallet_balance: self.wallet_balance,
            blocked: self.blocked,
            route_id: self.route_id,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RouteRow {
    id: Uuid,
    name: String,
    daily_fare: BigDecimal,
}

impl RouteRow {
    fn into_domain(self) -> Route {
        Route {
            id: self.id,
            name: self.name,
            daily_fare: self.daily_fare,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StopRow {
    id: Uuid,
    route_id: Uuid,
    name: String,
    sequence: i32,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl StopRow {
    fn into_domain(self) -> Stop {
        let location = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        };
        Stop {
            id: self.id,
            route_id: self.route_id,
            name: self.name,
            sequence: self.sequence,
            location,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    bus_id: Uuid,
    driver_id: Uuid,
    route_id: Uuid,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    active: bool,
    current_stop_sequence: i32,
}

impl TripRow {
    fn into_domain(self) -> ActiveTrip {
        ActiveTrip {
            id: self.id,
            bus_id: self.bus_id,
            driver_id: self.driver_id,
            route_id: self.route_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            active: self.active,
            current_stop_sequence: self.current_stop_sequence,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StopEventRow {
    id: Uuid,
    trip_id: Uuid,
    stop_id: Uuid,
    sequence: i32,
    status: String,
    arrived_at: Option<DateTime<Utc>>,
    departed_at: Option<DateTime<Utc>>,
}

impl StopEventRow {
    fn into_domain(self) -> StopEvent {
        let status = match self.status.as_str() {
            "arrived" => StopStatus::Arrived,
            "departed" => StopStatus::Departed,
            _ => StopStatus::Pending,
        };
        StopEvent {
            id: self.id,
            trip_id: self.trip_id,
            stop_id: self.stop_id,
            sequence: self.sequence,
            status,
            arrived_at: self.arrived_at,
            departed_at: self.departed_at,
        }
    }
}
