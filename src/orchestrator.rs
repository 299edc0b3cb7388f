use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{LedgerError, LedgerMirror, PayoutGateway, PayoutRequest, Rail, SnapshotStore};
use crate::fees::FeeBreakdown;
use crate::store::{LedgerStore, SettlementOutcome};

/// Drives payouts end to end: reserve on the ledger, put the order on the
/// wire, settle the verdict back into the ledger.
///
/// The gateway call runs between two ledger commits with no lock held, so
/// deposits, spends and status reads proceed while a payout is in flight.
/// The window between reservation and dispatch is also where cancellation is
/// legal; once `dispatch_payout` has moved the request to processing the
/// gateway call cannot be recalled.
#[derive(Debug)]
pub struct PayoutOrchestrator<P, M, G>
where
    P: SnapshotStore,
    M: LedgerMirror,
    G: PayoutGateway,
{
    store: Arc<LedgerStore<P, M>>,
    gateway: G,
}

impl<P, M, G> PayoutOrchestrator<P, M, G>
where
    P: SnapshotStore,
    M: LedgerMirror,
    G: PayoutGateway,
{
    pub fn new(store: Arc<LedgerStore<P, M>>, gateway: G) -> Self {
        Self { store, gateway }
    }

    pub fn store(&self) -> &LedgerStore<P, M> {
        &self.store
    }

    /// Reserve funds and queue the payout without dispatching it. The
    /// returned request is pending and can still be cancelled.
    pub async fn request_payout(
        &self,
        amount: Decimal,
        rail: Rail,
    ) -> Result<PayoutRequest, LedgerError> {
        self.store.reserve_payout(amount, rail).await
    }

    /// Send a pending payout through the gateway and settle the outcome.
    /// A gateway refusal settles the ledger first (funds released, records
    /// failed) and then surfaces as `LedgerError::Gateway`.
    pub async fn dispatch_payout(&self, id: Uuid) -> Result<PayoutRequest, LedgerError> {
        let order = self.store.begin_dispatch(id).await?;
        tracing::debug!("dispatching payout {} over {}", order.reference, order.rail);

        match self.gateway.create_payout(&order).await {
            Ok(receipt) => {
                self.store
                    .settle_payout(id, SettlementOutcome::Settled(receipt))
                    .await
            }
            Err(e) => {
                let reason = e.to_string();
                self.store
                    .settle_payout(id, SettlementOutcome::Failed(reason.clone()))
                    .await?;
                Err(LedgerError::Gateway(reason))
            }
        }
    }

    /// Reserve and dispatch in one call.
    pub async fn submit_payout(
        &self,
        amount: Decimal,
        rail: Rail,
    ) -> Result<PayoutRequest, LedgerError> {
        let request = self.request_payout(amount, rail).await?;
        self.dispatch_payout(request.id).await
    }

    pub async fn cancel_payout(&self, id: Uuid) -> Result<PayoutRequest, LedgerError> {
        self.store.cancel_payout(id).await
    }

    pub async fn payout_status(&self, id: Uuid) -> Option<PayoutRequest> {
        self.store.payout_status(id).await
    }

    pub fn quote_fee(&self, amount: Decimal) -> Result<FeeBreakdown, LedgerError> {
        self.store.quote_fee(amount)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::config::LedgerConfig;
    use crate::domain::{MethodDetails, PayoutOrder, PayoutStatus, SettlementReceipt};
    use crate::persistence::MemoryStore;
    use crate::store::NoMirror;

    struct SettlingGateway {
        calls: AtomicUsize,
    }

    impl SettlingGateway {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PayoutGateway for SettlingGateway {
        async fn create_payout(
            &self,
            order: &PayoutOrder,
        ) -> Result<SettlementReceipt, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SettlementReceipt {
                reference: format!("GW-{}", order.reference),
                settled_at: Utc::now(),
            })
        }
    }

    struct DecliningGateway;

    impl PayoutGateway for DecliningGateway {
        async fn create_payout(
            &self,
            _order: &PayoutOrder,
        ) -> Result<SettlementReceipt, LedgerError> {
            Err(LedgerError::Gateway("rail declined the order".to_string()))
        }
    }

    async fn funded_store() -> Arc<LedgerStore<MemoryStore, NoMirror>> {
        let store = LedgerStore::open("user-1", LedgerConfig::default(), MemoryStore::new())
            .await
            .unwrap();
        store.add_funds(dec!(500.00), "Seed").await.unwrap();
        store
            .link_method(Rail::Bank, MethodDetails::new("Checking"))
            .await
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn submit_settles_and_rewrites_the_reference() {
        let store = funded_store().await;
        let orchestrator = PayoutOrchestrator::new(store.clone(), SettlingGateway::new());

        let settled = orchestrator
            .submit_payout(dec!(100.00), Rail::Bank)
            .await
            .unwrap();
        assert_eq!(settled.status, PayoutStatus::Completed);
        assert!(settled.reference.starts_with("GW-PO-"));

        let state = store.snapshot().await;
        assert_eq!(state.balance, dec!(400.00));
        assert_eq!(state.available_balance, dec!(400.00));
        assert_eq!(state.total_payouts, dec!(100.00));
        assert_eq!(orchestrator.gateway.calls(), 1);
    }

    #[tokio::test]
    async fn declined_payout_releases_funds_and_surfaces_the_error() {
        let store = funded_store().await;
        let orchestrator = PayoutOrchestrator::new(store.clone(), DecliningGateway);

        let err = orchestrator
            .submit_payout(dec!(100.00), Rail::Bank)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Gateway(_)));

        let state = store.snapshot().await;
        assert_eq!(state.balance, dec!(500.00));
        assert_eq!(state.available_balance, dec!(500.00));
        assert_eq!(state.payout_history.len(), 1);
        assert_eq!(state.payout_history[0].status, PayoutStatus::Failed);
    }

    #[tokio::test]
    async fn validation_failures_never_reach_the_gateway() {
        let store = funded_store().await;
        let orchestrator = PayoutOrchestrator::new(store, SettlingGateway::new());

        let err = orchestrator
            .submit_payout(dec!(900.00), Rail::Bank)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        let err = orchestrator
            .submit_payout(dec!(100.00), Rail::Card)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoLinkedMethod(Rail::Card)));

        assert_eq!(orchestrator.gateway.calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_request_cannot_be_dispatched() {
        let store = funded_store().await;
        let orchestrator = PayoutOrchestrator::new(store.clone(), SettlingGateway::new());

        let request = orchestrator
            .request_payout(dec!(100.00), Rail::Bank)
            .await
            .unwrap();
        assert_eq!(
            orchestrator.payout_status(request.id).await.unwrap().status,
            PayoutStatus::Pending
        );

        orchestrator.cancel_payout(request.id).await.unwrap();
        let err = orchestrator.dispatch_payout(request.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        assert_eq!(orchestrator.gateway.calls(), 0);
        assert_eq!(store.snapshot().await.available_balance, dec!(500.00));
    }

    #[tokio::test]
    async fn quote_matches_the_charged_fee() {
        let store = funded_store().await;
        let orchestrator = PayoutOrchestrator::new(store, SettlingGateway::new());

        let quote = orchestrator.quote_fee(dec!(250.00)).unwrap();
        let settled = orchestrator
            .submit_payout(dec!(250.00), Rail::Bank)
            .await
            .unwrap();
        assert_eq!(settled.fee, quote.fee);
        assert_eq!(settled.net_amount, quote.net_amount);
    }
}
