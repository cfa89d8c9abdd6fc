use msl_common::Money;
use thiserror::Error;

use crate::{
    db_types::{RelatedDocument, TransactionSource, Wallet, WalletTransaction},
    traits::is_lock_contention,
};

#[derive(Debug, Clone, Error)]
pub enum WalletLedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No wallet exists for store {0}")]
    WalletNotFound(String),
    #[error("Insufficient funds: requested {requested}, but only {available} is available")]
    InsufficientFunds { requested: Money, available: Money },
    #[error("Invalid wallet operation: {0}")]
    ValidationError(String),
    #[error("The wallet ledger is contended, try again: {0}")]
    ConcurrencyConflict(String),
}

impl From<sqlx::Error> for WalletLedgerError {
    fn from(e: sqlx::Error) -> Self {
        if is_lock_contention(&e) {
            Self::ConcurrencyConflict(e.to_string())
        } else {
            Self::DatabaseError(e.to_string())
        }
    }
}

/// The money-movement primitives every other flow is built on.
///
/// A wallet balance only ever changes through [`credit_wallet`](WalletLedger::credit_wallet) and
/// [`debit_wallet`](WalletLedger::debit_wallet). Both append exactly one ledger entry in the same
/// transaction as the balance update, so the sum of entries always equals the stored balance and
/// [`replay_balance`](WalletLedger::replay_balance) can prove it.
#[allow(async_fn_in_trait)]
pub trait WalletLedger: Clone {
    async fn fetch_wallet(&self, store_id: &str) -> Result<Option<Wallet>, WalletLedgerError>;

    async fn fetch_or_create_wallet(&self, store_id: &str) -> Result<Wallet, WalletLedgerError>;

    /// Credits `amount` to the store wallet and appends the matching ledger entry. The amount
    /// must be strictly positive.
    async fn credit_wallet(
        &self,
        store_id: &str,
        amount: Money,
        source: TransactionSource,
        related: Option<RelatedDocument>,
        note: Option<String>,
    ) -> Result<(Wallet, WalletTransaction), WalletLedgerError>;

    /// Debits `amount` from the store wallet, guarded so the balance can never go negative.
    /// Fails with [`WalletLedgerError::InsufficientFunds`] when the wallet cannot cover it.
    async fn debit_wallet(
        &self,
        store_id: &str,
        amount: Money,
        source: TransactionSource,
        related: Option<RelatedDocument>,
        note: Option<String>,
    ) -> Result<(Wallet, WalletTransaction), WalletLedgerError>;

    /// The full ledger for a store, oldest entry first.
    async fn wallet_history(&self, store_id: &str) -> Result<Vec<WalletTransaction>, WalletLedgerError>;

    /// Recomputes the balance from the ledger alone. Equal to the stored balance unless the
    /// database has been tampered with outside this API.
    async fn replay_balance(&self, store_id: &str) -> Result<Money, WalletLedgerError>;
}
