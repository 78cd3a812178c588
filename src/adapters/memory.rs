//! In-memory binding of the storage ports.
//!
//! Backs the test-suite and serves as the fallback when no database is
//! configured. Suitable for a single process only; the per-entity locks
//! in the services provide the serialization the ports require.

use std::collections::HashMap;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    ActiveTrip, LedgerEntry, PassHolder, Route, ScanRecord, ScanStatus, Stop, StopEvent,
    StopStatus,
};
use crate::ports::{
    LedgerWriter, RepositoryError, RepositoryResult, RouteStopRepository, ScanLogWriter,
    StudentRepository, TripStore,
};

#[derive(Default)]
struct Inner {
    pass_holders: HashMap<Uuid, PassHolder>,
    scan_records: Vec<ScanRecord>,
    ledger: Vec<LedgerEntry>,
    routes: HashMap<Uuid, Route>,
    stops_by_route: HashMap<Uuid, Vec<Stop>>,
    trips: HashMap<Uuid, ActiveTrip>,
    events_by_trip: HashMap<Uuid, Vec<StopEvent>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_pass_holder(&self, holder: PassHolder) {
        self.inner
            .write()
            .await
            .pass_holders
            .insert(holder.id, holder);
    }

    pub async fn insert_route(&self, route: Route, mut stops: Vec<Stop>) {
        stops.sort_by_key(|stop| stop.sequence);
        let mut inner = self.inner.write().await;
        inner.stops_by_route.insert(route.id, stops);
        inner.routes.insert(route.id, route);
    }

    pub async fn pass_holder(&self, id: Uuid) -> Option<PassHolder> {
        self.inner.read().await.pass_holders.get(&id).cloned()
    }

    pub async fn scan_records(&self) -> Vec<ScanRecord> {
        self.inner.read().await.scan_records.clone()
    }

    pub async fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.inner.read().await.ledger.clone()
    }
}

#[async_trait]
impl StudentRepository for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Option<PassHolder>> {
        Ok(self.inner.read().await.pass_holders.get(&id).cloned())
    }

    async fn decrement_balance(
        &self,
        id: Uuid,
        amount: &BigDecimal,
    ) -> RepositoryResult<BigDecimal> {
        let mut inner = self.inner.write().await;
        let holder = inner
            .pass_holders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        if holder.wallet_balance < *amount {
            return Err(RepositoryError::Conflict(format!(
                "balance {} below deduction {}",
                holder.wallet_balance, amount
            )));
        }
        holder.wallet_balance = &holder.wallet_balance - amount;
        Ok(holder.wallet_balance.clone())
    }

    async fn count_successful_scans_since(
        &self,
        id: Uuid,
        since: DateTime<Utc>,
    ) -> RepositoryResult<i64> {
        let inner = self.inner.read().await;
        let count = inner
            .scan_records
            .iter()
            .filter(|record| {
                record.pass_holder_id == id
                    && record.status == ScanStatus::Success
                    && record.scanned_at >= since
            })
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl ScanLogWriter for MemoryStore {
    async fn append(&self, record: &ScanRecord) -> RepositoryResult<()> {
        self.inner.write().await.scan_records.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl LedgerWriter for MemoryStore {
    async fn append(&self, entry: &LedgerEntry) -> RepositoryResult<()> {
        self.inner.write().await.ledger.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl RouteStopRepository for MemoryStore {
    async fn get_route(&self, route_id: Uuid) -> RepositoryResult<Option<Route>> {
        Ok(self.inner.read().await.routes.get(&route_id).cloned())
    }

    async fn list_stops_for_route(&self, route_id: Uuid) -> RepositoryResult<Vec<Stop>> {
        Ok(self
            .inner
            .read()
            .await
            .stops_by_route
            .get(&route_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl TripStore for MemoryStore {
    async fn create_active_trip(&self, trip: &ActiveTrip) -> RepositoryResult<()> {
        self.inner.write().await.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn end_active_trip(
        &self,
        trip_id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(trip) = inner.trips.get_mut(&trip_id) {
            if trip.active {
                trip.active = false;
                trip.ended_at = Some(ended_at);
            }
        }
        Ok(())
    }

    async fn get_trip(&self, trip_id: Uuid) -> RepositoryResult<Option<ActiveTrip>> {
        Ok(self.inner.read().await.trips.get(&trip_id).cloned())
    }

    async fn get_active_trip_for_bus(
        &self,
        bus_id: Uuid,
    ) -> RepositoryResult<Option<ActiveTrip>> {
        Ok(self
            .inner
            .read()
            .await
            .trips
            .values()
            .find(|trip| trip.bus_id == bus_id && trip.active)
            .cloned())
    }

    async fn create_stop_events(&self, events: &[StopEvent]) -> RepositoryResult<()> {
        let mut inner = self.inner.write().await;
        for event in events {
            inner
                .events_by_trip
                .entry(event.trip_id)
                .or_default()
                .push(event.clone());
        }
        for list in inner.events_by_trip.values_mut() {
            list.sort_by_key(|ev| ev.sequence);
        }
        Ok(())
    }

    async fn update_stop_event(
        &self,
        event_id: Uuid,
        status: StopStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut inner = self.inner.write().await;
        let event = inner
            .events_by_trip
            .values_mut()
            .flat_map(|list| list.iter_mut())
            .find(|ev| ev.id == event_id)
            .ok_or_else(|| RepositoryError::NotFound(event_id.to_string()))?;
        event.status = status;
        match status {
            StopStatus::Arrived => event.arrived_at = Some(at),
            StopStatus::Departed => event.departed_at = Some(at),
            StopStatus::Pending => {}
        }
        Ok(())
    }

    async fn set_current_stop_sequence(
        &self,
        trip_id: Uuid,
        sequence: i32,
    ) -> RepositoryResult<()> {
        let mut inner = self.inner.write().await;
        let trip = inner
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| RepositoryError::NotFound(trip_id.to_string()))?;
        trip.current_stop_sequence = sequence;
        Ok(())
    }

    async fn list_stop_events(&self, trip_id: Uuid) -> RepositoryResult<Vec<StopEvent>> {
        Ok(self
            .inner
            .read()
            .await
            .events_by_trip
            .get(&trip_id)
            .cloned()
            .unwrap_or_default())
    }
}
