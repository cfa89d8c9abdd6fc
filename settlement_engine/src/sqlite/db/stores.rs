use log::{debug, info};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Store, StoreTier},
    policies::ReleasePolicy,
    sqlite::db::wallets,
    traits::SettlementError,
};

pub async fn fetch_store(store_id: &str, conn: &mut SqliteConnection) -> Result<Option<Store>, SettlementError> {
    let store = sqlx::query_as::<_, Store>("SELECT * FROM stores WHERE store_id = $1")
        .bind(store_id)
        .fetch_optional(conn)
        .await?;
    Ok(store)
}

/// Fetches a store, creating it and its wallet on first contact. New stores start on the
/// Standard tier, unverified.
pub async fn register_store(store_id: &str, name: &str, conn: &mut SqliteConnection) -> Result<Store, SettlementError> {
    if let Some(store) = fetch_store(store_id, &mut *conn).await? {
        return Ok(store);
    }
    let store = sqlx::query_as::<_, Store>("INSERT INTO stores (store_id, name) VALUES ($1, $2) RETURNING *")
        .bind(store_id)
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    wallets::insert_wallet_for_store(store_id, conn).await?;
    info!("🧑️ Registered store {store_id} ({name})");
    Ok(store)
}

/// Marks the store verified and flips the verification flag on every settlement of that store
/// that has not paid out yet. Released and reversed settlements keep their frozen snapshot.
pub(crate) async fn mark_verified(store_id: &str, conn: &mut SqliteConnection) -> Result<Store, SettlementError> {
    let store = sqlx::query_as::<_, Store>(
        "UPDATE stores SET verification_status = 'Verified', updated_at = CURRENT_TIMESTAMP WHERE store_id = $1 \
         RETURNING *",
    )
    .bind(store_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| SettlementError::ValidationError(format!("store {store_id} is not registered")))?;
    let flipped = sqlx::query(
        r#"UPDATE fund_releases SET verification_complete = 1, updated_at = CURRENT_TIMESTAMP
        WHERE store_id = $1 AND verification_complete = 0 AND status IN ('Pending', 'Ready', 'Failed')"#,
    )
    .bind(store_id)
    .execute(conn)
    .await?
    .rows_affected();
    debug!("🧑️ Store {store_id} verified; {flipped} open settlements updated");
    Ok(store)
}

/// The newest policy version for a tier. Policies are seeded by the migrations, so a missing row
/// means a broken deployment rather than a user error.
pub async fn fetch_policy(tier: StoreTier, conn: &mut SqliteConnection) -> Result<ReleasePolicy, SettlementError> {
    let policy = sqlx::query_as::<_, ReleasePolicy>(
        "SELECT * FROM release_policies WHERE store_tier = $1 ORDER BY version DESC LIMIT 1",
    )
    .bind(tier)
    .fetch_optional(conn)
    .await?
    .ok_or(SettlementError::PolicyNotFound(tier))?;
    Ok(policy)
}
