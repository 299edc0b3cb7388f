//! Client-resident bank ledger with payout orchestration.
//!
//! The ledger owns the authoritative balances, transaction history, payout
//! methods and welcome bonus for one user, persists every mutation to a
//! local snapshot store, and best-effort mirrors state to a remote payments
//! API. Payouts run through a reserve/dispatch/settle state machine so funds
//! are never double-spent while a disbursement is in flight.

pub mod config;
pub mod domain;
pub mod fees;
pub mod ingestion;
pub mod orchestrator;
pub mod persistence;
pub mod remote;
pub mod store;

pub use config::LedgerConfig;
pub use domain::{
    LedgerError, LedgerState, MethodDetails, PayoutMethod, PayoutRequest, PayoutStatus, Rail,
    Transaction, TransactionKind, TransactionStatus, WelcomeBonus,
};
pub use fees::{FeeBreakdown, FeeSchedule};
pub use orchestrator::PayoutOrchestrator;
pub use persistence::{FileStore, MemoryStore};
pub use remote::PaymentApiClient;
pub use store::{DebitKind, LedgerStore, NoMirror, SettlementOutcome};
