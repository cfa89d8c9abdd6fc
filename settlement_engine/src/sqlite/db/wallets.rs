use log::debug;
use msl_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{EntryType, RelatedDocument, TransactionSource, Wallet, WalletTransaction},
    traits::WalletLedgerError,
};

pub async fn fetch_wallet(store_id: &str, conn: &mut SqliteConnection) -> Result<Option<Wallet>, WalletLedgerError> {
    let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE store_id = $1")
        .bind(store_id)
        .fetch_optional(conn)
        .await?;
    Ok(wallet)
}

/// Creates the wallet row for a store if it does not exist yet. The store row itself must
/// already be present; wallets are created alongside stores in [`super::stores::register_store`].
pub(crate) async fn insert_wallet_for_store(
    store_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Wallet, WalletLedgerError> {
    if let Some(wallet) = fetch_wallet(store_id, &mut *conn).await? {
        return Ok(wallet);
    }
    let wallet = sqlx::query_as::<_, Wallet>("INSERT INTO wallets (store_id) VALUES ($1) RETURNING *")
        .bind(store_id)
        .fetch_one(conn)
        .await?;
    debug!("🧑️ Created wallet {} for store {store_id}", wallet.id);
    Ok(wallet)
}

/// Appends one row to the append-only ledger. Callers must pass the balance as of this entry,
/// taken from the RETURNING clause of the balance update in the same transaction.
pub(crate) async fn insert_transaction(
    wallet_id: i64,
    entry_type: EntryType,
    amount: Money,
    balance_after: Money,
    source: TransactionSource,
    related: Option<RelatedDocument>,
    note: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<WalletTransaction, WalletLedgerError> {
    let (related_type, related_id) = match related {
        Some(doc) => (Some(doc.doc_type), Some(doc.doc_id)),
        None => (None, None),
    };
    let entry = sqlx::query_as::<_, WalletTransaction>(
        r#"INSERT INTO wallet_transactions (wallet_id, entry_type, amount, balance_after, source, related_type, related_id, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *"#,
    )
    .bind(wallet_id)
    .bind(entry_type)
    .bind(amount)
    .bind(balance_after)
    .bind(source)
    .bind(related_type)
    .bind(related_id)
    .bind(note)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Recorded {entry_type} of {amount} on wallet {wallet_id}");
    Ok(entry)
}

pub(crate) async fn credit(
    store_id: &str,
    amount: Money,
    source: TransactionSource,
    related: Option<RelatedDocument>,
    note: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<(Wallet, WalletTransaction), WalletLedgerError> {
    if amount.value() <= 0 {
        return Err(WalletLedgerError::ValidationError(format!("credit amount must be positive, got {amount}")));
    }
    let wallet = sqlx::query_as::<_, Wallet>(
        "UPDATE wallets SET balance = balance + $1, updated_at = CURRENT_TIMESTAMP WHERE store_id = $2 RETURNING *",
    )
    .bind(amount)
    .bind(store_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| WalletLedgerError::WalletNotFound(store_id.to_string()))?;
    let entry =
        insert_transaction(wallet.id, EntryType::Credit, amount, wallet.balance, source, related, note, conn).await?;
    Ok((wallet, entry))
}

/// Debits the wallet, guarded in SQL so a concurrent debit can never drive the balance negative.
/// The losing caller gets [`WalletLedgerError::InsufficientFunds`] with the live balance.
pub(crate) async fn debit(
    store_id: &str,
    amount: Money,
    source: TransactionSource,
    related: Option<RelatedDocument>,
    note: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<(Wallet, WalletTransaction), WalletLedgerError> {
    if amount.value() <= 0 {
        return Err(WalletLedgerError::ValidationError(format!("debit amount must be positive, got {amount}")));
    }
    let updated = sqlx::query_as::<_, Wallet>(
        r#"UPDATE wallets SET balance = balance - $1, updated_at = CURRENT_TIMESTAMP
        WHERE store_id = $2 AND balance >= $3 RETURNING *"#,
    )
    .bind(amount)
    .bind(store_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;
    let wallet = match updated {
        Some(w) => w,
        None => {
            let wallet = fetch_wallet(store_id, &mut *conn)
                .await?
                .ok_or_else(|| WalletLedgerError::WalletNotFound(store_id.to_string()))?;
            return Err(WalletLedgerError::InsufficientFunds { requested: amount, available: wallet.balance });
        },
    };
    let entry =
        insert_transaction(wallet.id, EntryType::Debit, amount, wallet.balance, source, related, note, conn).await?;
    Ok((wallet, entry))
}

/// Moves escrowed value on or off the pending balance. Pending is bookkeeping for unreleased
/// settlements; it is not part of the replayable ledger, so no transaction row is written.
pub(crate) async fn adjust_pending(
    store_id: &str,
    delta: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, WalletLedgerError> {
    let wallet = sqlx::query_as::<_, Wallet>(
        "UPDATE wallets SET pending = pending + $1, updated_at = CURRENT_TIMESTAMP WHERE store_id = $2 RETURNING *",
    )
    .bind(delta)
    .bind(store_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| WalletLedgerError::WalletNotFound(store_id.to_string()))?;
    Ok(wallet)
}

/// The wallet side of a fund release payout: the escrowed value moves off `pending`, onto
/// `balance` and into `total_earned`, all in one statement.
pub(crate) async fn settle_payout(
    store_id: &str,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, WalletLedgerError> {
    let wallet = sqlx::query_as::<_, Wallet>(
        r#"UPDATE wallets SET balance = balance + $1, pending = pending - $1, total_earned = total_earned + $1,
        updated_at = CURRENT_TIMESTAMP
        WHERE store_id = $2 RETURNING *"#,
    )
    .bind(amount)
    .bind(store_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| WalletLedgerError::WalletNotFound(store_id.to_string()))?;
    Ok(wallet)
}

/// Claws a payout back: balance and lifetime earnings both shrink by the released amount. The
/// balance guard makes this fail cleanly when the store has already spent the money.
pub(crate) async fn reverse_payout(
    store_id: &str,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, WalletLedgerError> {
    let updated = sqlx::query_as::<_, Wallet>(
        r#"UPDATE wallets SET balance = balance - $1, total_earned = total_earned - $1,
        updated_at = CURRENT_TIMESTAMP
        WHERE store_id = $2 AND balance >= $3 RETURNING *"#,
    )
    .bind(amount)
    .bind(store_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(wallet) => Ok(wallet),
        None => {
            let wallet = fetch_wallet(store_id, conn)
                .await?
                .ok_or_else(|| WalletLedgerError::WalletNotFound(store_id.to_string()))?;
            Err(WalletLedgerError::InsufficientFunds { requested: amount, available: wallet.balance })
        },
    }
}

pub async fn history(store_id: &str, conn: &mut SqliteConnection) -> Result<Vec<WalletTransaction>, WalletLedgerError> {
    let entries = sqlx::query_as::<_, WalletTransaction>(
        r#"SELECT wt.* FROM wallet_transactions wt
        JOIN wallets w ON w.id = wt.wallet_id
        WHERE w.store_id = $1 ORDER BY wt.id ASC"#,
    )
    .bind(store_id)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}

/// Recomputes the balance as the sum of credits minus debits. Used by the reconciliation
/// endpoint and the tests to prove the stored balance and the ledger never drift apart.
pub async fn replay_balance(store_id: &str, conn: &mut SqliteConnection) -> Result<Money, WalletLedgerError> {
    let wallet = fetch_wallet(store_id, &mut *conn)
        .await?
        .ok_or_else(|| WalletLedgerError::WalletNotFound(store_id.to_string()))?;
    let total: Option<i64> = sqlx::query_scalar(
        r#"SELECT SUM(CASE entry_type WHEN 'Credit' THEN amount ELSE -amount END)
        FROM wallet_transactions WHERE wallet_id = $1"#,
    )
    .bind(wallet.id)
    .fetch_one(conn)
    .await?;
    Ok(Money::from(total.unwrap_or_default()))
}
