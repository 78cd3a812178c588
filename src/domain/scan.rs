//! Scan and ledger domain types.
//!
//! Every scan attempt against a known holder produces exactly one
//! immutable [`ScanRecord`]; a fare-charging scan additionally produces
//! one [`LedgerEntry`] whose before/after balances bracket the deduction.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome tag persisted on a scan record.
///
/// An unknown pass code is never recorded (there is no holder row to log
/// against), so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Success,
    Blocked,
    LimitExceeded,
    InsufficientBalance,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Success => "success",
            ScanStatus::Blocked => "blocked",
            ScanStatus::LimitExceeded => "limit_exceeded",
            ScanStatus::InsufficientBalance => "insufficient_balance",
        }
    }
}

/// Result of a boarding scan, returned to the scanning client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    Success {
        fare_charged: BigDecimal,
        balance: BigDecimal,
        /// True for the free second scan of the day.
        return_trip: bool,
    },
    NotFound,
    Blocked,
    LimitExceeded,
    InsufficientBalance {
        required: BigDecimal,
        available: BigDecimal,
    },
}

/// Immutable audit row for one scan attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub id: Uuid,
    pub pass_holder_id: Uuid,
    pub bus_id: Uuid,
    pub driver_id: Uuid,
    pub scanned_at: DateTime<Utc>,
    pub status: ScanStatus,
    pub fare_charged: BigDecimal,
    pub balance_after: BigDecimal,
}

impl ScanRecord {
    pub fn new(
        pass_holder_id: Uuid,
        bus_id: Uuid,
        driver_id: Uuid,
        status: ScanStatus,
        fare_charged: BigDecimal,
        balance_after: BigDecimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pass_holder_id,
            bus_id,
            driver_id,
            scanned_at: Utc::now(),
            status,
            fare_charged,
            balance_after,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Deduction,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Deduction => "deduction",
        }
    }
}

/// Immutable record of a wallet balance change.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub pass_holder_id: Uuid,
    pub amount: BigDecimal,
    pub kind: LedgerKind,
    pub balance_before: BigDecimal,
    pub balance_after: BigDecimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn deduction(
        pass_holder_id: Uuid,
        amount: BigDecimal,
        balance_before: BigDecimal,
        balance_after: BigDecimal,
        description: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pass_holder_id,
            amount,
            kind: LedgerKind::Deduction,
            balance_before,
            balance_after,
            description,
            created_at: Utc::now(),
        }
    }
}
