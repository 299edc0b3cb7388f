use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::error::LedgerError;

/// Fraction digits carried by every monetary amount in the ledger.
pub const TARGET_DECIMALS: u32 = 2;

/// Round to 2 decimal places, half-up (0.005 -> 0.01, away from zero).
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(TARGET_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

/// True when `value` fits the ledger scale (at most 2 fraction digits).
pub fn valid_scale(value: Decimal) -> bool {
    value.normalize().scale() <= TARGET_DECIMALS
}

/// Format an amount for the wire: decimal string with exactly 2 fraction digits.
pub fn format_amount(value: Decimal) -> String {
    let mut v = round_half_up(value);
    v.rescale(TARGET_DECIMALS);
    v.to_string()
}

/// Parse a decimal amount string. Rejects malformed input and amounts carrying
/// more than 2 fraction digits, so callers never round user input silently.
pub fn parse_amount(s: &str) -> Result<Decimal, LedgerError> {
    let value =
        Decimal::from_str(s.trim()).map_err(|_| LedgerError::InvalidAmount(Decimal::ZERO))?;
    if !valid_scale(value) {
        return Err(LedgerError::InvalidAmount(value));
    }
    Ok(value)
}
