use std::sync::{Arc, Mutex};

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use payout_ledger::domain::{
    LedgerError, LedgerMirror, LedgerState, MethodDetails, PayoutGateway, PayoutOrder,
    SettlementReceipt, SnapshotStore,
};
use payout_ledger::{
    DebitKind, LedgerConfig, LedgerStore, MemoryStore, NoMirror, PayoutOrchestrator,
    PayoutStatus, Rail, TransactionKind, TransactionStatus,
};

struct SettlingGateway;

impl PayoutGateway for SettlingGateway {
    async fn create_payout(&self, order: &PayoutOrder) -> Result<SettlementReceipt, LedgerError> {
        Ok(SettlementReceipt {
            reference: format!("GW-{}", order.reference),
            settled_at: Utc::now(),
        })
    }
}

struct DecliningGateway;

impl PayoutGateway for DecliningGateway {
    async fn create_payout(&self, _order: &PayoutOrder) -> Result<SettlementReceipt, LedgerError> {
        Err(LedgerError::Gateway("no funds at the rail".to_string()))
    }
}

#[derive(Clone, Default)]
struct RecordingMirror {
    balances: Arc<Mutex<Vec<Decimal>>>,
}

impl LedgerMirror for RecordingMirror {
    async fn push_snapshot(&self, _user_id: &str, state: &LedgerState) -> Result<(), LedgerError> {
        self.balances.lock().unwrap().push(state.balance);
        Ok(())
    }
}

struct OfflineMirror;

impl LedgerMirror for OfflineMirror {
    async fn push_snapshot(
        &self,
        _user_id: &str,
        _state: &LedgerState,
    ) -> Result<(), LedgerError> {
        Err(LedgerError::Sync("mirror unreachable".to_string()))
    }
}

async fn funded_store() -> Arc<LedgerStore<MemoryStore, NoMirror>> {
    let store = LedgerStore::open("user-1", LedgerConfig::default(), MemoryStore::new())
        .await
        .unwrap();
    store.add_funds(dec!(500.00), "Earnings").await.unwrap();
    store
        .link_method(Rail::Bank, MethodDetails::new("Checking").with_last4("4321"))
        .await
        .unwrap();
    Arc::new(store)
}

#[tokio::test]
async fn settled_payout_round_trip_keeps_the_books_consistent() {
    let store = funded_store().await;
    let orchestrator = PayoutOrchestrator::new(store.clone(), SettlingGateway);

    let settled = orchestrator
        .submit_payout(dec!(100.00), Rail::Bank)
        .await
        .unwrap();
    assert_eq!(settled.status, PayoutStatus::Completed);
    assert!(settled.reference.starts_with("GW-PO-"));

    let state = store.snapshot().await;
    assert_eq!(state.balance, dec!(400.00));
    assert_eq!(state.available_balance, dec!(400.00));
    assert_eq!(state.pending_balance(), Decimal::ZERO);
    assert_eq!(state.total_payouts, dec!(100.00));
    assert_eq!(state.balance, state.sum_completed());
    state.check_invariants().unwrap();
}

#[tokio::test]
async fn failed_payout_returns_every_cent() {
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
    assert_eq!(state.total_payouts, Decimal::ZERO);
    assert_eq!(state.payout_history[0].status, PayoutStatus::Failed);
    assert_eq!(state.balance, state.sum_completed());
    state.check_invariants().unwrap();
}

#[tokio::test]
async fn cancellation_refunds_without_changing_the_balance() {
    let store = funded_store().await;
    let orchestrator = PayoutOrchestrator::new(store.clone(), SettlingGateway);

    let request = orchestrator
        .request_payout(dec!(150.00), Rail::Bank)
        .await
        .unwrap();
    assert_eq!(store.snapshot().await.pending_balance(), dec!(150.00));

    let cancelled = orchestrator.cancel_payout(request.id).await.unwrap();
    assert_eq!(cancelled.status, PayoutStatus::Cancelled);

    let state = store.snapshot().await;
    assert_eq!(state.balance, dec!(500.00));
    assert_eq!(state.available_balance, dec!(500.00));
    assert_eq!(state.pending_balance(), Decimal::ZERO);

    let refund = state
        .transactions
        .iter()
        .find(|t| t.kind == TransactionKind::Refund)
        .unwrap();
    assert_eq!(refund.amount, dec!(150.00));
    assert_eq!(refund.status, TransactionStatus::Completed);
    assert_eq!(state.balance, state.sum_completed());
    state.check_invariants().unwrap();
}

#[tokio::test]
async fn rejected_operations_leave_no_trace() {
    let store = funded_store().await;

    let before = store.snapshot().await;
    let err = store
        .deduct_funds(dec!(9999.00), DebitKind::Withdrawal, "Cash out")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

    let after = store.snapshot().await;
    assert_eq!(after.balance, before.balance);
    assert_eq!(after.available_balance, before.available_balance);
    assert_eq!(after.transactions.len(), before.transactions.len());
}

#[tokio::test]
async fn concurrent_bonus_claims_credit_exactly_once() {
    let store = Arc::new(
        LedgerStore::open("user-1", LedgerConfig::default(), MemoryStore::new())
            .await
            .unwrap(),
    );

    let (first, second) = tokio::join!(store.claim_welcome_bonus(), store.claim_welcome_bonus());
    assert!(first.is_ok() != second.is_ok());
    let loser = first.err().or(second.err()).unwrap();
    assert!(matches!(loser, LedgerError::AlreadyClaimed));

    let state = store.snapshot().await;
    assert_eq!(state.balance, dec!(2500.00));
    assert_eq!(
        state
            .transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Bonus)
            .count(),
        1
    );
}

#[tokio::test]
async fn concurrent_payouts_cannot_overdraw_the_reserve() {
    let store = funded_store().await;
    let orchestrator = Arc::new(PayoutOrchestrator::new(store.clone(), SettlingGateway));

    // 500.00 available; two 300.00 payouts cannot both reserve
    let (first, second) = tokio::join!(
        orchestrator.submit_payout(dec!(300.00), Rail::Bank),
        orchestrator.submit_payout(dec!(300.00), Rail::Bank)
    );
    assert!(first.is_ok() != second.is_ok());
    let loser = first.err().or(second.err()).unwrap();
    assert!(matches!(loser, LedgerError::InsufficientFunds { .. }));

    let state = store.snapshot().await;
    assert_eq!(state.balance, dec!(200.00));
    assert_eq!(state.total_payouts, dec!(300.00));
    assert_eq!(state.balance, state.sum_completed());
    state.check_invariants().unwrap();
}

#[tokio::test]
async fn cancelling_while_dispatching_resolves_exactly_one_way() {
    let store = funded_store().await;
    let orchestrator = Arc::new(PayoutOrchestrator::new(store.clone(), SettlingGateway));

    let request = orchestrator
        .request_payout(dec!(100.00), Rail::Bank)
        .await
        .unwrap();

    let (cancelled, dispatched) = tokio::join!(
        orchestrator.cancel_payout(request.id),
        orchestrator.dispatch_payout(request.id)
    );
    let cancel_won = cancelled.is_ok();
    assert!(cancel_won != dispatched.is_ok());
    let loser = cancelled.err().or(dispatched.err()).unwrap();
    assert!(matches!(loser, LedgerError::InvalidTransition { .. }));

    let state = store.snapshot().await;
    if cancel_won {
        // the reserve came back exactly once
        assert_eq!(state.balance, dec!(500.00));
        assert_eq!(state.available_balance, dec!(500.00));
        assert_eq!(state.total_payouts, Decimal::ZERO);
    } else {
        assert_eq!(state.balance, dec!(400.00));
        assert_eq!(state.available_balance, dec!(400.00));
        assert_eq!(state.total_payouts, dec!(100.00));
    }
    assert_eq!(state.pending_balance(), Decimal::ZERO);
    assert_eq!(state.balance, state.sum_completed());
    state.check_invariants().unwrap();
}

#[tokio::test]
async fn ledger_reloads_from_its_snapshot() {
    let backend = Arc::new(MemoryStore::new());

    {
        let store = LedgerStore::open("user-1", LedgerConfig::default(), backend.clone())
            .await
            .unwrap();
        store.add_funds(dec!(240.00), "Earnings").await.unwrap();
        store
            .link_method(Rail::Card, MethodDetails::new("Visa").with_last4("0007"))
            .await
            .unwrap();
        store
            .deduct_funds(dec!(40.00), DebitKind::Purchase, "Order")
            .await
            .unwrap();
    }

    let reopened = LedgerStore::open("user-1", LedgerConfig::default(), backend)
        .await
        .unwrap();
    let state = reopened.snapshot().await;
    assert_eq!(state.balance, dec!(200.00));
    assert_eq!(state.transactions.len(), 2);
    assert_eq!(state.linked_methods.len(), 1);
    // reopening does not re-grant the bonus
    assert_eq!(
        state
            .transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Bonus)
            .count(),
        0
    );
}

#[tokio::test]
async fn malformed_snapshots_are_rejected_on_open() {
    let backend = Arc::new(MemoryStore::new());
    backend
        .set("bank:user-1", json!({"balance": "not a number"}))
        .await
        .unwrap();

    let err = LedgerStore::open("user-1", LedgerConfig::default(), backend)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(_)));
}

#[tokio::test]
async fn drifted_snapshots_fail_the_invariant_check_on_open() {
    let backend = Arc::new(MemoryStore::new());
    {
        let store = LedgerStore::open("user-1", LedgerConfig::default(), backend.clone())
            .await
            .unwrap();
        store.add_funds(dec!(100.00), "Earnings").await.unwrap();
    }

    // tamper with the stored balance so it no longer matches the history
    let mut snapshot = backend.get("bank:user-1").await.unwrap().unwrap();
    snapshot["balance"] = json!("90.00");
    backend.set("bank:user-1", snapshot).await.unwrap();

    let err = LedgerStore::open("user-1", LedgerConfig::default(), backend)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(_)));
}

#[tokio::test]
async fn every_mutation_reaches_the_mirror() {
    let mirror = RecordingMirror::default();
    let handle = mirror.clone();
    let store = LedgerStore::open_with_mirror(
        "user-1",
        LedgerConfig::default(),
        MemoryStore::new(),
        mirror,
    )
    .await
    .unwrap();

    store.add_funds(dec!(100.00), "Earnings").await.unwrap();
    store
        .deduct_funds(dec!(30.00), DebitKind::Purchase, "Order")
        .await
        .unwrap();

    let pushed = handle.balances.lock().unwrap().clone();
    assert_eq!(pushed, vec![dec!(100.00), dec!(70.00)]);
}

#[tokio::test]
async fn unreachable_mirror_never_blocks_local_mutations() {
    let store = LedgerStore::open_with_mirror(
        "user-1",
        LedgerConfig::default(),
        MemoryStore::new(),
        OfflineMirror,
    )
    .await
    .unwrap();

    store.add_funds(dec!(75.00), "Earnings").await.unwrap();
    assert_eq!(store.snapshot().await.balance, dec!(75.00));
}
