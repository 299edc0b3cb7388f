use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::bonus::WelcomeBonus;
use crate::domain::error::LedgerError;
use crate::domain::payout::{PayoutMethod, PayoutRequest};
use crate::domain::transaction::Transaction;

/// Authoritative per-user ledger state. Owned exclusively by the
/// `LedgerStore`; the UI only ever sees clones of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    /// Total funds, always >= 0.
    pub balance: Decimal,
    /// Funds not reserved by in-flight payouts, <= balance.
    pub available_balance: Decimal,
    /// Lifetime credits, monotonically non-decreasing.
    pub total_earned: Decimal,
    /// Lifetime settled payouts, monotonically non-decreasing.
    pub total_payouts: Decimal,
    // Histories grow unbounded; fine for a local-first single-user ledger at
    // modest scale.
    pub transactions: Vec<Transaction>,
    pub payout_history: Vec<PayoutRequest>,
    /// Unique by id; at most one default among verified methods.
    pub linked_methods: Vec<PayoutMethod>,
    #[serde(default)]
    pub welcome_bonus: Option<WelcomeBonus>,
}

impl LedgerState {
    pub fn new(welcome_bonus: Option<WelcomeBonus>) -> Self {
        Self {
            balance: Decimal::ZERO,
            available_balance: Decimal::ZERO,
            total_earned: Decimal::ZERO,
            total_payouts: Decimal::ZERO,
            transactions: Vec::new(),
            payout_history: Vec::new(),
            linked_methods: Vec::new(),
            welcome_bonus,
        }
    }

    /// Funds reserved against in-flight payouts. Derived, never stored.
    pub fn pending_balance(&self) -> Decimal {
        self.balance - self.available_balance
    }

    pub fn method(&self, id: Uuid) -> Option<&PayoutMethod> {
        self.linked_methods.iter().find(|m| m.id == id)
    }

    pub fn payout(&self, id: Uuid) -> Option<&PayoutRequest> {
        self.payout_history.iter().find(|p| p.id == id)
    }

    pub fn payout_mut(&mut self, id: Uuid) -> Option<&mut PayoutRequest> {
        self.payout_history.iter_mut().find(|p| p.id == id)
    }

    /// The statement transaction mirroring a payout request; the pair shares
    /// one reference code until settlement rewrites the request's.
    pub fn payout_transaction_mut(&mut self, reference: &str) -> Option<&mut Transaction> {
        self.transactions
            .iter_mut()
            .find(|t| t.reference == reference)
    }

    pub fn sum_completed(&self) -> Decimal {
        self.transactions
            .iter()
            .filter(|t| t.status.is_completed())
            .map(|t| t.amount)
            .sum()
    }

    /// Verify the ledger invariants. Run after every mutation in debug builds
    /// and against every snapshot loaded from storage.
    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        if self.balance < Decimal::ZERO {
            return Err(LedgerError::Storage(format!(
                "negative balance {}",
                self.balance
            )));
        }
        if self.available_balance < Decimal::ZERO || self.available_balance > self.balance {
            return Err(LedgerError::Storage(format!(
                "available balance {} outside 0..={}",
                self.available_balance, self.balance
            )));
        }
        let completed = self.sum_completed();
        if completed != self.balance {
            return Err(LedgerError::Storage(format!(
                "balance {} != completed transaction sum {}",
                self.balance, completed
            )));
        }
        let defaults = self
            .linked_methods
            .iter()
            .filter(|m| m.is_verified && m.is_default)
            .count();
        if defaults > 1 {
            return Err(LedgerError::Storage(format!(
                "{defaults} verified methods marked default"
            )));
        }
        Ok(())
    }
}
