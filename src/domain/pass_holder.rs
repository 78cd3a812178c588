//! Pass holder domain entity.
//! Framework-agnostic representation of a student bus pass and its wallet.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A student holding a wallet-backed bus pass.
///
/// The core only ever reads this entity and conditionally decrements the
/// wallet balance; the blocked flag and route assignment are owned by the
/// admin side of the system.
#[derive(Debug, Clone)]
pub struct PassHolder {
    pub id: Uuid,
    pub name: String,
    pub wallet_balance: BigDecimal,
    pub blocked: bool,
    pub route_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl PassHolder {
    pub fn new(name: String, wallet_balance: BigDecimal, route_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            wallet_balance,
            blocked: false,
            route_id,
            created_at: Utc::now(),
        }
    }
}
