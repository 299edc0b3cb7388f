use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Payout,
    Bonus,
    Purchase,
    Refund,
}

impl TransactionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Payout => "payout",
            Self::Bonus => "bonus",
            Self::Purchase => "purchase",
            Self::Refund => "refund",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// Only completed transactions count toward the balance.
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// A single balance-affecting event. Immutable once created except for
/// `status`, which transitions in place as the underlying operation settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    /// Signed: credits positive, debits negative.
    pub amount: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    /// Short human-readable code shown on statements, derived from the id.
    pub reference: String,
    pub fee: Option<Decimal>,
    pub net_amount: Option<Decimal>,
}

impl Transaction {
    pub fn new(
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
        status: TransactionStatus,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            kind,
            amount,
            description: description.into(),
            status,
            created_at: Utc::now(),
            reference: reference_code("TXN", id),
            fee: None,
            net_amount: None,
        }
    }

    pub fn with_fee(mut self, fee: Decimal, net_amount: Decimal) -> Self {
        self.fee = Some(fee);
        self.net_amount = Some(net_amount);
        self
    }

    /// Share another record's reference code (payout transactions carry their
    /// request's code so the statement lines up with the payout history).
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }
}

impl core::fmt::Display for Transaction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{},{:?},amount={},ref={}",
            self.kind.label(),
            self.status,
            self.amount,
            self.reference
        )
    }
}

/// Build a short statement reference ("TXN-9F86D081") from an id.
pub fn reference_code(prefix: &str, id: Uuid) -> String {
    let simple = id.simple().to_string();
    format!("{}-{}", prefix, simple[..8].to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn reference_codes_are_prefixed_and_stable() {
        let id = Uuid::new_v4();
        let a = reference_code("TXN", id);
        let b = reference_code("TXN", id);
        assert_eq!(a, b);
        assert!(a.starts_with("TXN-"));
        assert_eq!(a.len(), "TXN-".len() + 8);
    }

    #[test]
    fn new_transactions_carry_no_fee_by_default() {
        let tx = Transaction::new(
            TransactionKind::Deposit,
            dec!(25.00),
            "Top-up",
            TransactionStatus::Completed,
        );
        assert!(tx.fee.is_none());
        assert!(tx.net_amount.is_none());

        let tx = tx.with_fee(dec!(0.73), dec!(24.27));
        assert_eq!(tx.fee, Some(dec!(0.73)));
        assert_eq!(tx.net_amount, Some(dec!(24.27)));
    }

    #[test]
    fn serializes_kind_and_status_snake_case() {
        let tx = Transaction::new(
            TransactionKind::Payout,
            dec!(-10.00),
            "Payout",
            TransactionStatus::Pending,
        );
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["kind"], "payout");
        assert_eq!(value["status"], "pending");
    }
}
