pub mod account;
pub mod bonus;
pub mod error;
pub mod money;
pub mod payout;
pub mod traits;
pub mod transaction;

pub use account::LedgerState;
pub use bonus::{BonusStatus, WelcomeBonus};
pub use error::LedgerError;
pub use payout::{MethodDetails, PayoutMethod, PayoutRequest, PayoutStatus, Rail};
pub use traits::{LedgerMirror, PayoutGateway, PayoutOrder, SettlementReceipt, SnapshotStore};
pub use transaction::{Transaction, TransactionKind, TransactionStatus};
