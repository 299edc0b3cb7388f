use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::LedgerError;
use crate::domain::money;

/// Disbursement fee configuration: a percentage in basis points with a floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub rate_bps: u32,
    pub floor: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        // 2.9% with a 25 cent floor
        Self {
            rate_bps: 290,
            floor: dec!(0.25),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub fee: Decimal,
    pub net_amount: Decimal,
}

/// `fee = max(floor, amount * rate_bps / 10000)` rounded half-up to cents;
/// `net_amount = amount - fee`. Pure: the UI preview path and the payout
/// commit path call this with the same schedule, so the previewed fee is the
/// charged fee.
pub fn compute_fee(amount: Decimal, schedule: &FeeSchedule) -> Result<FeeBreakdown, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    let rated = money::round_half_up(amount * Decimal::from(schedule.rate_bps) / dec!(10000));
    let fee = rated.max(schedule.floor);
    Ok(FeeBreakdown {
        fee,
        net_amount: amount - fee,
    })
}
