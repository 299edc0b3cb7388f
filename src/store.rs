use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::domain::{
    BonusStatus, LedgerError, LedgerMirror, LedgerState, MethodDetails, PayoutMethod,
    PayoutOrder, PayoutRequest, PayoutStatus, Rail, SettlementReceipt, SnapshotStore,
    Transaction, TransactionKind, TransactionStatus, WelcomeBonus, money,
};
use crate::fees::{self, FeeBreakdown};

/// Mirror seam for callers that run purely local.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoMirror;

impl LedgerMirror for NoMirror {
    async fn push_snapshot(
        &self,
        _user_id: &str,
        _state: &LedgerState,
    ) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Debit flavors the host can record directly against the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitKind {
    Withdrawal,
    Purchase,
}

impl DebitKind {
    fn transaction_kind(self) -> TransactionKind {
        match self {
            Self::Withdrawal => TransactionKind::Withdrawal,
            Self::Purchase => TransactionKind::Purchase,
        }
    }
}

/// How a dispatched payout came back from the gateway.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Settled(SettlementReceipt),
    Failed(String),
}

fn storage_key(user_id: &str) -> String {
    format!("bank:{user_id}")
}

/// The authoritative ledger for one user.
///
/// Every mutation runs as a closure under one async mutex: the closure
/// validates first, then writes, and cannot suspend, so no interleaving can
/// observe a half-applied mutation. The snapshot write happens while the lock
/// is still held; the mirror push happens after release. Both are best-effort
/// and never fail the mutation itself.
#[derive(Debug)]
pub struct LedgerStore<P, M>
where
    P: SnapshotStore,
    M: LedgerMirror,
{
    user_id: String,
    key: String,
    config: LedgerConfig,
    persistence: P,
    mirror: M,
    state: Mutex<LedgerState>,
}

impl<P> LedgerStore<P, NoMirror>
where
    P: SnapshotStore,
{
    pub async fn open(
        user_id: impl Into<String>,
        config: LedgerConfig,
        persistence: P,
    ) -> Result<Self, LedgerError> {
        Self::open_with_mirror(user_id, config, persistence, NoMirror).await
    }
}

impl<P, M> LedgerStore<P, M>
where
    P: SnapshotStore,
    M: LedgerMirror,
{
    /// Load the persisted snapshot, or initialize a fresh ledger carrying a
    /// pending welcome bonus. A snapshot that fails to decode or that breaks
    /// the ledger invariants is rejected rather than silently replaced.
    pub async fn open_with_mirror(
        user_id: impl Into<String>,
        config: LedgerConfig,
        persistence: P,
        mirror: M,
    ) -> Result<Self, LedgerError> {
        let user_id = user_id.into();
        let key = storage_key(&user_id);

        let state = match persistence.get(&key).await? {
            Some(value) => {
                let mut state: LedgerState = serde_json::from_value(value).map_err(|e| {
                    LedgerError::Storage(format!("snapshot under '{key}' failed to decode: {e}"))
                })?;
                state.check_invariants()?;
                if let Some(bonus) = state.welcome_bonus.as_mut() {
                    bonus.refresh_expiry(Utc::now());
                }
                tracing::debug!(
                    "loaded ledger for {user_id} balance={} transactions={}",
                    state.balance,
                    state.transactions.len()
                );
                state
            }
            None => {
                tracing::debug!("no snapshot under '{key}', initializing fresh ledger");
                LedgerState::new(Some(WelcomeBonus::new(
                    config.bonus_amount,
                    config.bonus_validity_days,
                )))
            }
        };

        let store = Self {
            user_id,
            key,
            config,
            persistence,
            mirror,
            state: Mutex::new(state),
        };
        {
            let state = store.state.lock().await;
            store.persist(&state).await;
        }
        Ok(store)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Run one mutation under the state lock. The closure must validate
    /// before it touches state; a returned error means state was not changed.
    async fn commit<T>(
        &self,
        op: &'static str,
        mutate: impl FnOnce(&mut LedgerState) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let (result, committed) = {
            let mut state = self.state.lock().await;
            let result = mutate(&mut state)?;
            debug_assert!(
                state.check_invariants().is_ok(),
                "ledger invariant violated after {op}"
            );
            self.persist(&state).await;
            (result, state.clone())
        };
        if let Err(e) = self.mirror.push_snapshot(&self.user_id, &committed).await {
            tracing::warn!("mirror push after {op} failed for {}: {e}", self.user_id);
        }
        Ok(result)
    }

    async fn persist(&self, state: &LedgerState) {
        match serde_json::to_value(state) {
            Ok(value) => {
                if let Err(e) = self.persistence.set(&self.key, value).await {
                    tracing::warn!("snapshot write under '{}' failed: {e}", self.key);
                }
            }
            Err(e) => tracing::warn!("snapshot encode for '{}' failed: {e}", self.key),
        }
    }

    /// Current state for display. Re-evaluates bonus expiry so a stale
    /// pending bonus never renders as claimable.
    pub async fn snapshot(&self) -> LedgerState {
        let mut state = self.state.lock().await;
        let expired = state
            .welcome_bonus
            .as_mut()
            .is_some_and(|b| b.refresh_expiry(Utc::now()));
        if expired {
            self.persist(&state).await;
        }
        state.clone()
    }

    /// Pure lookup, no side effects.
    pub async fn payout_status(&self, id: Uuid) -> Option<PayoutRequest> {
        let state = self.state.lock().await;
        state.payout(id).cloned()
    }

    /// Fee preview for an amount, identical to what a payout of that amount
    /// would be charged.
    pub fn quote_fee(&self, amount: Decimal) -> Result<FeeBreakdown, LedgerError> {
        fees::compute_fee(amount, &self.config.fee)
    }

    pub async fn add_funds(
        &self,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Result<Transaction, LedgerError> {
        let description = description.into();
        self.commit("add_funds", move |state| {
            if amount <= Decimal::ZERO || !money::valid_scale(amount) {
                return Err(LedgerError::InvalidAmount(amount));
            }
            state.balance += amount;
            state.available_balance += amount;
            state.total_earned += amount;
            let tx = Transaction::new(
                TransactionKind::Deposit,
                amount,
                description,
                TransactionStatus::Completed,
            );
            state.transactions.push(tx.clone());
            tracing::debug!("credited {amount}, balance now {}", state.balance);
            Ok(tx)
        })
        .await
    }

    /// Record a spend or withdrawal. Funds reserved by in-flight payouts are
    /// not spendable, so the check runs against the available balance.
    pub async fn deduct_funds(
        &self,
        amount: Decimal,
        kind: DebitKind,
        description: impl Into<String>,
    ) -> Result<Transaction, LedgerError> {
        let description = description.into();
        self.commit("deduct_funds", move |state| {
            if amount <= Decimal::ZERO || !money::valid_scale(amount) {
                return Err(LedgerError::InvalidAmount(amount));
            }
            if state.available_balance < amount {
                return Err(LedgerError::InsufficientFunds {
                    requested: amount,
                    available: state.available_balance,
                });
            }
            state.balance -= amount;
            state.available_balance -= amount;
            let tx = Transaction::new(
                kind.transaction_kind(),
                -amount,
                description,
                TransactionStatus::Completed,
            );
            state.transactions.push(tx.clone());
            tracing::debug!("debited {amount}, balance now {}", state.balance);
            Ok(tx)
        })
        .await
    }

    /// Link a payout destination. The first linked method becomes the
    /// default.
    pub async fn link_method(
        &self,
        rail: Rail,
        details: MethodDetails,
    ) -> Result<PayoutMethod, LedgerError> {
        self.commit("link_method", move |state| {
            let method = PayoutMethod {
                id: Uuid::new_v4(),
                rail,
                display_name: details.display_name,
                last4: details.last4,
                is_default: state.linked_methods.is_empty(),
                is_verified: true,
                added_at: Utc::now(),
            };
            state.linked_methods.push(method.clone());
            tracing::debug!("linked {rail} method {}", method.id);
            Ok(method)
        })
        .await
    }

    /// Unlink a method. If the default is removed no other method is
    /// promoted; payouts keep working through per-rail selection until the
    /// user picks a new default.
    pub async fn remove_method(&self, id: Uuid) -> Result<(), LedgerError> {
        self.commit("remove_method", move |state| {
            let index = state
                .linked_methods
                .iter()
                .position(|m| m.id == id)
                .ok_or(LedgerError::NotFound(id))?;
            let removed = state.linked_methods.remove(index);
            tracing::debug!("removed {} method {}", removed.rail, removed.id);
            Ok(())
        })
        .await
    }

    pub async fn set_default_method(&self, id: Uuid) -> Result<PayoutMethod, LedgerError> {
        self.commit("set_default_method", move |state| {
            if state.method(id).is_none() {
                return Err(LedgerError::NotFound(id));
            }
            for method in &mut state.linked_methods {
                method.is_default = method.id == id;
            }
            state
                .linked_methods
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or(LedgerError::NotFound(id))
        })
        .await
    }

    /// Claim the welcome bonus. At most one claim can ever succeed: the
    /// status flips to claimed in the same critical section that credits the
    /// funds, so a concurrent second claim always observes it.
    pub async fn claim_welcome_bonus(&self) -> Result<Transaction, LedgerError> {
        self.commit("claim_welcome_bonus", |state| {
            let now = Utc::now();
            let bonus = state
                .welcome_bonus
                .as_mut()
                .ok_or(LedgerError::NotEligible)?;
            // Overdue bonuses fail here without flipping status; the lazy
            // pending-to-expired transition belongs to the read path, which
            // persists it.
            match bonus.status {
                BonusStatus::Claimed => return Err(LedgerError::AlreadyClaimed),
                BonusStatus::Expired => return Err(LedgerError::NotEligible),
                BonusStatus::Pending if bonus.is_expired_at(now) => {
                    return Err(LedgerError::NotEligible);
                }
                BonusStatus::Pending => {}
            }
            bonus.status = BonusStatus::Claimed;
            bonus.claimed_at = Some(now);
            let amount = bonus.amount;

            state.balance += amount;
            state.available_balance += amount;
            state.total_earned += amount;
            let transaction = Transaction::new(
                TransactionKind::Bonus,
                amount,
                "Welcome bonus",
                TransactionStatus::Completed,
            );
            state.transactions.push(transaction.clone());
            tracing::debug!("welcome bonus of {amount} claimed");
            Ok(transaction)
        })
        .await
    }

    /// Validate and reserve funds for a payout. On success the request sits
    /// in `pending` with the amount moved out of the available balance, and a
    /// pending statement transaction carries the same reference code.
    pub async fn reserve_payout(
        &self,
        amount: Decimal,
        rail: Rail,
    ) -> Result<PayoutRequest, LedgerError> {
        let (min, max) = (self.config.min_payout, self.config.max_payout);
        let schedule = self.config.fee.clone();
        self.commit("reserve_payout", move |state| {
            if amount <= Decimal::ZERO || !money::valid_scale(amount) {
                return Err(LedgerError::InvalidAmount(amount));
            }
            if amount < min || amount > max {
                return Err(LedgerError::AmountOutOfRange { amount, min, max });
            }
            if state.available_balance < amount {
                return Err(LedgerError::InsufficientFunds {
                    requested: amount,
                    available: state.available_balance,
                });
            }
            select_method(state, rail)?;

            let breakdown = fees::compute_fee(amount, &schedule)?;
            let request = PayoutRequest::new(amount, rail, breakdown.fee, breakdown.net_amount);

            state.available_balance -= amount;
            state.transactions.push(
                Transaction::new(
                    TransactionKind::Payout,
                    -amount,
                    format!("Payout via {rail}"),
                    TransactionStatus::Pending,
                )
                .with_fee(breakdown.fee, breakdown.net_amount)
                .with_reference(&request.reference),
            );
            state.payout_history.push(request.clone());
            tracing::debug!(
                "reserved payout {} amount={amount} rail={rail}",
                request.reference
            );
            Ok(request)
        })
        .await
    }

    /// Move a pending payout to processing and hand back the order to put on
    /// the wire. The payout method is chosen here, at dispatch time: the
    /// default method when it sits on the requested rail, otherwise the
    /// first linked method on that rail.
    pub async fn begin_dispatch(&self, id: Uuid) -> Result<PayoutOrder, LedgerError> {
        self.commit("begin_dispatch", move |state| {
            let method_id = {
                let request = state.payout(id).ok_or(LedgerError::NotFound(id))?;
                select_method(state, request.rail)?
            };
            let request = state.payout_mut(id).ok_or(LedgerError::NotFound(id))?;
            request.status = request.status.transition(PayoutStatus::Processing)?;
            Ok(PayoutOrder {
                payout_id: request.id,
                amount: request.amount,
                net_amount: request.net_amount,
                rail: request.rail,
                method_id,
                reference: request.reference.clone(),
            })
        })
        .await
    }

    /// Apply the gateway verdict for a processing payout.
    ///
    /// Settled: the reserve is consumed, the request takes the gateway
    /// settlement reference, and the statement transaction completes under
    /// its original code. Failed: the reserve returns to the available
    /// balance and both records flip to failed.
    pub async fn settle_payout(
        &self,
        id: Uuid,
        outcome: SettlementOutcome,
    ) -> Result<PayoutRequest, LedgerError> {
        self.commit("settle_payout", move |state| {
            let request = state.payout(id).ok_or(LedgerError::NotFound(id))?;
            let local_reference = request.reference.clone();
            let amount = request.amount;

            match outcome {
                SettlementOutcome::Settled(receipt) => {
                    let request = state.payout_mut(id).ok_or(LedgerError::NotFound(id))?;
                    request.status = request.status.transition(PayoutStatus::Completed)?;
                    request.completed_at = Some(receipt.settled_at);
                    request.reference = receipt.reference;
                    let updated = request.clone();

                    if let Some(tx) = state.payout_transaction_mut(&local_reference) {
                        tx.status = TransactionStatus::Completed;
                    }
                    state.balance -= amount;
                    state.total_payouts += amount;
                    tracing::debug!(
                        "payout {local_reference} settled as {}, balance now {}",
                        updated.reference,
                        state.balance
                    );
                    Ok(updated)
                }
                SettlementOutcome::Failed(reason) => {
                    let request = state.payout_mut(id).ok_or(LedgerError::NotFound(id))?;
                    request.status = request.status.transition(PayoutStatus::Failed)?;
                    let updated = request.clone();

                    if let Some(tx) = state.payout_transaction_mut(&local_reference) {
                        tx.status = TransactionStatus::Failed;
                    }
                    state.available_balance += amount;
                    tracing::warn!("payout {local_reference} failed: {reason}");
                    Ok(updated)
                }
            }
        })
        .await
    }

    /// Cancel a payout that has not been dispatched. The reserve returns to
    /// the available balance, a refund transaction records the release, and
    /// the payout's statement transaction completes so the two net to zero.
    pub async fn cancel_payout(&self, id: Uuid) -> Result<PayoutRequest, LedgerError> {
        self.commit("cancel_payout", move |state| {
            let request = state.payout_mut(id).ok_or(LedgerError::NotFound(id))?;
            request.status = request.status.transition(PayoutStatus::Cancelled)?;
            let updated = request.clone();
            let amount = updated.amount;

            if let Some(tx) = state.payout_transaction_mut(&updated.reference) {
                tx.status = TransactionStatus::Completed;
            }
            state.available_balance += amount;
            state.transactions.push(Transaction::new(
                TransactionKind::Refund,
                amount,
                format!("Payout {} cancelled", updated.reference),
                TransactionStatus::Completed,
            ));
            tracing::debug!("payout {} cancelled, reserve released", updated.reference);
            Ok(updated)
        })
        .await
    }
}

/// Pick the method to settle through: the default when its rail matches,
/// otherwise the first linked method on the rail.
fn select_method(state: &LedgerState, rail: Rail) -> Result<Uuid, LedgerError> {
    let mut on_rail = state.linked_methods.iter().filter(|m| m.rail == rail);
    let first = on_rail.next().ok_or(LedgerError::NoLinkedMethod(rail))?;
    Ok(state
        .linked_methods
        .iter()
        .find(|m| m.is_default && m.rail == rail)
        .unwrap_or(first)
        .id)
}
