use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusStatus {
    Pending,
    Claimed,
    Expired,
}

/// One-time credit granted at account initialization, gated by an expiry and
/// a claim-once guard. The status enum is the single source of truth; the
/// source's separate `claimed` boolean is derived, not stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeBonus {
    pub id: Uuid,
    pub amount: Decimal,
    pub status: BonusStatus,
    pub claimed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub requirements: BTreeSet<String>,
}

impl WelcomeBonus {
    pub fn new(amount: Decimal, validity_days: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            status: BonusStatus::Pending,
            claimed_at: None,
            expires_at: Utc::now() + Duration::days(validity_days),
            requirements: BTreeSet::new(),
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self.status, BonusStatus::Claimed)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Flip an overdue pending bonus to expired. Returns true when the status
    /// changed. Claimed bonuses never expire retroactively.
    pub fn refresh_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == BonusStatus::Pending && self.is_expired_at(now) {
            self.status = BonusStatus::Expired;
            return true;
        }
        false
    }
}
