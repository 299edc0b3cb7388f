use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::account::LedgerState;
use crate::domain::error::LedgerError;
use crate::domain::payout::Rail;

/// Device-local persisted key-value store. Values are JSON documents; keys
/// are opaque strings. The host app supplies the real (encrypted) store.
#[allow(async_fn_in_trait)]
pub trait SnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, LedgerError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), LedgerError>;

    async fn remove(&self, key: &str) -> Result<(), LedgerError>;
}

impl<S: SnapshotStore> SnapshotStore for std::sync::Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Value>, LedgerError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), LedgerError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), LedgerError> {
        (**self).remove(key).await
    }
}

/// What the orchestrator hands to a disbursement rail.
#[derive(Debug, Clone)]
pub struct PayoutOrder {
    pub payout_id: Uuid,
    pub amount: Decimal,
    pub net_amount: Decimal,
    pub rail: Rail,
    pub method_id: Uuid,
    pub reference: String,
}

/// Settlement outcome reported by a gateway for a dispatched payout.
#[derive(Debug, Clone)]
pub struct SettlementReceipt {
    pub reference: String,
    pub settled_at: DateTime<Utc>,
}

/// Remote disbursement service. Opaque: it accepts an order and eventually
/// reports a settlement outcome. The call is not cancellable once dispatched
/// and no timeout is imposed on it.
#[allow(async_fn_in_trait)]
pub trait PayoutGateway {
    async fn create_payout(&self, order: &PayoutOrder) -> Result<SettlementReceipt, LedgerError>;
}

/// Best-effort remote mirror of the full ledger state, pushed after every
/// local mutation. Failures are logged and never fail the mutation.
#[allow(async_fn_in_trait)]
pub trait LedgerMirror {
    async fn push_snapshot(
        &self,
        user_id: &str,
        state: &LedgerState,
    ) -> Result<(), LedgerError>;
}
