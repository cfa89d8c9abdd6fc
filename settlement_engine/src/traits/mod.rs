//! The backend interfaces for the settlement engine.
//!
//! Every storage backend implements these traits; the APIs in [`crate::se_api`] are generic over
//! them, so nothing above this layer knows which database it is talking to. The SQLite backend
//! in [`crate::sqlite`] is the only implementation shipped today.

mod auth_management;
mod data_objects;
mod ledger_management;
mod settlement_database;
mod wallet_ledger;
mod withdrawal_management;

pub use auth_management::{AuthApiError, AuthManagement};
pub use data_objects::{EvaluationOutcome, ReleaseOutcome, ReturnUpdate};
pub use ledger_management::{LedgerManagement, LedgerQueryError};
pub use settlement_database::{SettlementDatabase, SettlementError};
pub use wallet_ledger::{WalletLedger, WalletLedgerError};
pub use withdrawal_management::{WithdrawalError, WithdrawalManagement};

/// SQLite reports lock contention with BUSY/LOCKED result codes. Callers see those as
/// concurrency conflicts they can retry, not as generic database failures.
pub(crate) fn is_lock_contention(e: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(de) = e {
        matches!(de.code().as_deref(), Some("5") | Some("6") | Some("261") | Some("517"))
    } else {
        matches!(e, sqlx::Error::PoolTimedOut)
    }
}
