use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::fees::FeeSchedule;

/// Policy knobs for a ledger instance. Everything here is data, not code:
/// two stores opened with the same config behave identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub fee: FeeSchedule,
    pub min_payout: Decimal,
    pub max_payout: Decimal,
    pub bonus_amount: Decimal,
    pub bonus_validity_days: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fee: FeeSchedule::default(),
            min_payout: dec!(1.00),
            max_payout: dec!(10000.00),
            bonus_amount: dec!(2500.00),
            bonus_validity_days: 30,
        }
    }
}
