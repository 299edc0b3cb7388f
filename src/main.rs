use std::sync::Arc;
use std::{env, fs::File, path::Path};

use chrono::Utc;
use futures::StreamExt;

use payout_ledger::config::LedgerConfig;
use payout_ledger::domain::{
    LedgerError, LedgerMirror, LedgerState, MethodDetails, PayoutGateway, PayoutOrder,
    SettlementReceipt, SnapshotStore, money,
};
use payout_ledger::ingestion::{CsvSessionReader, SessionOp, SessionStream};
use payout_ledger::orchestrator::PayoutOrchestrator;
use payout_ledger::persistence::FileStore;
use payout_ledger::store::{DebitKind, LedgerStore};

const USAGE: &str = "usage: payout_ledger <session.csv> <state-dir> [user-id]";

/// Stand-in rail for replay: settles every order immediately.
#[derive(Default, Debug)]
struct SimGateway;

impl PayoutGateway for SimGateway {
    async fn create_payout(&self, order: &PayoutOrder) -> Result<SettlementReceipt, LedgerError> {
        Ok(SettlementReceipt {
            reference: format!("SIM-{}", order.reference),
            settled_at: Utc::now(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = env::args();
    let session_path = args.nth(1).ok_or(USAGE)?;
    let state_dir = args.next().ok_or(USAGE)?;
    let user_id = args.next().unwrap_or_else(|| "local".to_string());

    let file = File::open(Path::new(&session_path))?;
    let mut session = CsvSessionReader::new(file);

    let store = Arc::new(
        LedgerStore::open(user_id, LedgerConfig::default(), FileStore::new(&state_dir)).await?,
    );
    let orchestrator = PayoutOrchestrator::new(store.clone(), SimGateway);

    let mut ops = session.stream();
    while let Some(op) = ops.next().await {
        let result = match op {
            Ok(op) => apply(&orchestrator, op).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            eprintln!("Error processing session op: {}", e);
        }
    }

    print_summary(&store.snapshot().await);

    Ok(())
}

async fn apply<P, M, G>(
    orchestrator: &PayoutOrchestrator<P, M, G>,
    op: SessionOp,
) -> Result<(), LedgerError>
where
    P: SnapshotStore,
    M: LedgerMirror,
    G: PayoutGateway,
{
    let store = orchestrator.store();
    match op {
        SessionOp::Deposit { amount, note } => {
            store.add_funds(amount, note).await?;
        }
        SessionOp::Spend { amount, note } => {
            store.deduct_funds(amount, DebitKind::Purchase, note).await?;
        }
        SessionOp::Withdraw { amount, note } => {
            store
                .deduct_funds(amount, DebitKind::Withdrawal, note)
                .await?;
        }
        SessionOp::Link { rail, name } => {
            store.link_method(rail, MethodDetails::new(name)).await?;
        }
        SessionOp::ClaimBonus => {
            store.claim_welcome_bonus().await?;
        }
        SessionOp::Payout { amount, rail } => {
            orchestrator.submit_payout(amount, rail).await?;
        }
        SessionOp::Request { amount, rail } => {
            orchestrator.request_payout(amount, rail).await?;
        }
        SessionOp::CancelLast => {
            let state = store.snapshot().await;
            let target = state
                .payout_history
                .iter()
                .rev()
                .find(|p| p.status.can_cancel())
                .map(|p| p.id)
                .ok_or_else(|| {
                    LedgerError::Ingestion("no pending payout to cancel".to_string())
                })?;
            orchestrator.cancel_payout(target).await?;
        }
    }
    Ok(())
}

fn print_summary(state: &LedgerState) {
    println!("balance,available,pending,total_earned,total_payouts");
    println!(
        "{},{},{},{},{}",
        money::format_amount(state.balance),
        money::format_amount(state.available_balance),
        money::format_amount(state.pending_balance()),
        money::format_amount(state.total_earned),
        money::format_amount(state.total_payouts),
    );
}
