//! Boarding-scan processing: decides the outcome of a QR pass scan and
//! applies the wallet/ledger side effects.
//!
//! The count-then-charge sequence for a holder runs under a per-holder
//! async mutex, with the daily scan count re-read inside the critical
//! section. Writes are ordered ledger entry -> scan record -> balance
//! decrement: the daily count is derived from scan records, so a retry
//! after a partial failure can never charge the same holder twice in a
//! day.

use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{LedgerEntry, ScanOutcome, ScanRecord, ScanStatus};
use crate::ports::{LedgerWriter, Notifier, RepositoryResult, ScanLogWriter, StudentRepository};

/// Successful scans allowed per holder per calendar day. The first one
/// charges fare; the second is the free return trip.
const DAILY_SCAN_LIMIT: i64 = 2;

/// A balance under this many fares triggers a low-balance notification.
const LOW_BALANCE_FARES: u32 = 3;

pub struct FareScanProcessor {
    students: Arc<dyn StudentRepository>,
    scan_log: Arc<dyn ScanLogWriter>,
    ledger: Arc<dyn LedgerWriter>,
    notifier: Arc<dyn Notifier>,
    holder_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl FareScanProcessor {
    pub fn new(
        students: Arc<dyn StudentRepository>,
        scan_log: Arc<dyn ScanLogWriter>,
        ledger: Arc<dyn LedgerWriter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            students,
            scan_log,
            ledger,
            notifier,
            holder_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Process one boarding scan.
    ///
    /// `pass_code` is the opaque string decoded from the QR code and is
    /// expected to be a pass holder id; anything that does not resolve is
    /// `NotFound` and leaves no scan record.
    pub async fn process_scan(
        &self,
        pass_code: &str,
        bus_id: Uuid,
        driver_id: Uuid,
        daily_fare: &BigDecimal,
    ) -> RepositoryResult<ScanOutcome> {
        let holder_id = match Uuid::parse_str(pass_code.trim()) {
            Ok(id) => id,
            Err(_) => {
                tracing::debug!("scan with unparseable pass code");
                return Ok(ScanOutcome::NotFound);
            }
        };

        // Serialize concurrent scans for the same holder; the daily count
        // and balance are only trustworthy inside this critical section.
        let lock = self.holder_lock(holder_id).await;
        let _guard = lock.lock().await;

        let holder = match self.students.get_by_id(holder_id).await? {
            Some(holder) => holder,
            None => return Ok(ScanOutcome::NotFound),
        };

        if holder.blocked {
            let record = ScanRecord::new(
                holder.id,
                bus_id,
                driver_id,
                ScanStatus::Blocked,
                BigDecimal::from(0),
                holder.wallet_balance.clone(),
            );
            self.scan_log.append(&record).await?;
            return Ok(ScanOutcome::Blocked);
        }

        let day_start = local_day_start(Utc::now());
        let scans_today = self
            .students
            .count_successful_scans_since(holder.id, day_start)
            .await?;

        if scans_today >= DAILY_SCAN_LIMIT {
            let record = ScanRecord::new(
                holder.id,
                bus_id,
                driver_id,
                ScanStatus::LimitExceeded,
                BigDecimal::from(0),
                holder.wallet_balance.clone(),
            );
            self.scan_log.append(&record).await?;
            return Ok(ScanOutcome::LimitExceeded);
        }

        if scans_today == 1 {
            // Return trip: free, no ledger entry.
            let record = ScanRecord::new(
                holder.id,
                bus_id,
                driver_id,
                ScanStatus::Success,
                BigDecimal::from(0),
                holder.wallet_balance.clone(),
            );
            self.scan_log.append(&record).await?;
            return Ok(ScanOutcome::Success {
                fare_charged: BigDecimal::from(0),
                balance: holder.wallet_balance,
                return_trip: true,
            });
        }

        // First scan of the day: charge fare.
        if holder.wallet_balance < *daily_fare {
            let record = ScanRecord::new(
                holder.id,
                bus_id,
                driver_id,
                ScanStatus::InsufficientBalance,
                BigDecimal::from(0),
                holder.wallet_balance.clone(),
            );
            self.scan_log.append(&record).await?;
            return Ok(ScanOutcome::InsufficientBalance {
                required: daily_fare.clone(),
                available: holder.wallet_balance,
            });
        }

        let balance_before = holder.wallet_balance.clone();
        let balance_after = &balance_before - daily_fare;

        let entry = LedgerEntry::deduction(
            holder.id,
            daily_fare.clone(),
            balance_before,
            balance_after.clone(),
            "daily bus fare".to_string(),
        );
        self.ledger.append(&entry).await?;

        let record = ScanRecord::new(
            holder.id,
            bus_id,
            driver_id,
            ScanStatus::Success,
            daily_fare.clone(),
            balance_after.clone(),
        );
        self.scan_log.append(&record).await?;

        let new_balance = self.students.decrement_balance(holder.id, daily_fare).await?;
        if new_balance != balance_after {
            tracing::warn!(
                holder = %holder.id,
                "ledger balance drift: expected {}, store returned {}",
                balance_after,
                new_balance
            );
        }

        if new_balance < daily_fare * BigDecimal::from(LOW_BALANCE_FARES) {
            let notifier = Arc::clone(&self.notifier);
            let balance = new_balance.clone();
            tokio::spawn(async move {
                if let Err(err) = notifier.send_low_balance(holder_id, &balance).await {
                    tracing::warn!(holder = %holder_id, "low-balance notification failed: {err:#}");
                }
            });
        }

        Ok(ScanOutcome::Success {
            fare_charged: daily_fare.clone(),
            balance: new_balance,
            return_trip: false,
        })
    }

    async fn holder_lock(&self, holder_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.holder_locks.lock().await;
        locks.entry(holder_id).or_default().clone()
    }
}

/// Midnight of the current local calendar day, in UTC.
fn local_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = now
        .with_timezone(&Local)
        .date_naive()
        .and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn day_start_is_at_most_a_day_behind() {
        let now = Utc::now();
        let start = local_day_start(now);
        assert!(start <= now);
        assert!(now - start < Duration::hours(24) + Duration::minutes(1));
    }
}
