use std::fmt::Debug;

use log::*;
use msl_common::Money;

use crate::{
    db_types::{TransactionSource, Wallet, WalletTransaction},
    se_api::WalletReconciliation,
    traits::{WalletLedger, WalletLedgerError},
};

/// `WalletApi` exposes store wallet balances, ledgers, and manual adjustments.
///
/// The order, release and withdrawal flows move money on their own; this API is for support
/// staff and reconciliation jobs. Manual adjustments always carry a note so an auditor reading
/// the ledger can tell why the balance moved.
pub struct WalletApi<B> {
    db: B,
}

impl<B> Debug for WalletApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WalletApi")
    }
}

impl<B> WalletApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> WalletApi<B>
where B: WalletLedger
{
    pub async fn balance(&self, store_id: &str) -> Result<Option<Wallet>, WalletLedgerError> {
        self.db.fetch_wallet(store_id).await
    }

    pub async fn fetch_or_create_wallet(&self, store_id: &str) -> Result<Wallet, WalletLedgerError> {
        self.db.fetch_or_create_wallet(store_id).await
    }

    /// The full ledger for a store, oldest entry first.
    pub async fn history(&self, store_id: &str) -> Result<Vec<WalletTransaction>, WalletLedgerError> {
        self.db.wallet_history(store_id).await
    }

    /// Credits a wallet outside the normal flows. The note is mandatory since an adjustment with
    /// no paper trail is indistinguishable from fraud.
    pub async fn credit_adjustment(
        &self,
        store_id: &str,
        amount: Money,
        note: &str,
        actor: &str,
    ) -> Result<(Wallet, WalletTransaction), WalletLedgerError> {
        let note = adjustment_note(note, actor)?;
        info!("💰️ Manual credit of {amount} to store {store_id} by {actor}");
        self.db.credit_wallet(store_id, amount, TransactionSource::Adjustment, None, Some(note)).await
    }

    /// Debits a wallet outside the normal flows, subject to the usual overdraft guard.
    pub async fn debit_adjustment(
        &self,
        store_id: &str,
        amount: Money,
        note: &str,
        actor: &str,
    ) -> Result<(Wallet, WalletTransaction), WalletLedgerError> {
        let note = adjustment_note(note, actor)?;
        info!("💰️ Manual debit of {amount} from store {store_id} by {actor}");
        self.db.debit_wallet(store_id, amount, TransactionSource::Adjustment, None, Some(note)).await
    }

    /// Replays the ledger and compares the result with the stored balance. A mismatch means the
    /// database has been modified outside this API and is logged as an error.
    pub async fn reconcile(&self, store_id: &str) -> Result<WalletReconciliation, WalletLedgerError> {
        let wallet = self
            .db
            .fetch_wallet(store_id)
            .await?
            .ok_or_else(|| WalletLedgerError::WalletNotFound(store_id.to_string()))?;
        let replayed = self.db.replay_balance(store_id).await?;
        let report = WalletReconciliation::new(store_id.to_string(), wallet.balance, replayed);
        if !report.consistent {
            error!("🚨️ {report}");
        }
        Ok(report)
    }
}

fn adjustment_note(note: &str, actor: &str) -> Result<String, WalletLedgerError> {
    let note = note.trim();
    if note.is_empty() {
        return Err(WalletLedgerError::ValidationError(
            "Manual wallet adjustments require an audit note".to_string(),
        ));
    }
    Ok(format!("{actor}: {note}"))
}
