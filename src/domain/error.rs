use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::payout::{PayoutStatus, Rail};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Amount {amount} is outside the allowed payout range {min}..={max}")]
    AmountOutOfRange {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error("No linked payout method for rail '{0}'")]
    NoLinkedMethod(Rail),

    #[error("No record found for id {0}")]
    NotFound(Uuid),

    #[error("Welcome bonus has already been claimed")]
    AlreadyClaimed,

    #[error("Welcome bonus is not eligible for claiming")]
    NotEligible,

    #[error("Illegal payout transition from '{from}' to '{to}'")]
    InvalidTransition {
        from: PayoutStatus,
        to: PayoutStatus,
    },

    #[error("Disbursement gateway failed: {0}")]
    Gateway(String),

    #[error("Remote sync failed: {0}")]
    Sync(String),

    #[error("Storage failed: {0}")]
    Storage(String),

    #[error("Ingestion failed with: {0}")]
    Ingestion(String),
}
