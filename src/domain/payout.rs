use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::LedgerError;
use crate::domain::transaction::reference_code;

/// A disbursement channel through which a payout is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rail {
    Card,
    Bank,
    WalletA,
    WalletB,
    PeerNetwork,
}

impl Rail {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Bank => "bank",
            Self::WalletA => "wallet_a",
            Self::WalletB => "wallet_b",
            Self::PeerNetwork => "peer_network",
        }
    }
}

impl core::fmt::Display for Rail {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rail {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "card" => Ok(Self::Card),
            "bank" => Ok(Self::Bank),
            "wallet_a" => Ok(Self::WalletA),
            "wallet_b" => Ok(Self::WalletB),
            "peer_network" => Ok(Self::PeerNetwork),
            other => Err(LedgerError::Ingestion(format!("unknown rail '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PayoutStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Cancellation is only legal before dispatch.
    pub fn can_cancel(self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Validate a state-machine move. Every status change in the ledger goes
    /// through here so an illegal move cannot happen silently.
    pub fn transition(self, to: PayoutStatus) -> Result<PayoutStatus, LedgerError> {
        let legal = matches!(
            (self, to),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Cancelled)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        );
        if legal {
            Ok(to)
        } else {
            Err(LedgerError::InvalidTransition { from: self, to })
        }
    }
}

impl core::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payout through its lifecycle, kept in `payout_history` forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub id: Uuid,
    pub amount: Decimal,
    pub rail: Rail,
    pub status: PayoutStatus,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Local code until settlement, then the gateway settlement reference.
    pub reference: String,
}

impl PayoutRequest {
    pub fn new(amount: Decimal, rail: Rail, fee: Decimal, net_amount: Decimal) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            amount,
            rail,
            status: PayoutStatus::Pending,
            fee,
            net_amount,
            requested_at: Utc::now(),
            completed_at: None,
            reference: reference_code("PO", id),
        }
    }
}

/// A linked destination for payouts on one rail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutMethod {
    pub id: Uuid,
    pub rail: Rail,
    pub display_name: String,
    pub last4: Option<String>,
    pub is_default: bool,
    pub is_verified: bool,
    pub added_at: DateTime<Utc>,
}

/// Host-supplied details when linking a method. Credentials stay with the
/// rail SDK; only display data reaches the ledger.
#[derive(Debug, Clone)]
pub struct MethodDetails {
    pub display_name: String,
    pub last4: Option<String>,
}

impl MethodDetails {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            last4: None,
        }
    }

    pub fn with_last4(mut self, last4: impl Into<String>) -> Self {
        self.last4 = Some(last4.into());
        self
    }
}
