use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{
        FundRelease,
        NewFundRelease,
        OrderId,
        ReleaseStatus,
        ReleaseTrigger,
        SubOrderId,
        WalletTransaction,
    },
    se_api::ReleaseQueryFilter,
    traits::SettlementError,
};

pub(crate) async fn insert_release(
    new: NewFundRelease,
    conn: &mut SqliteConnection,
) -> Result<FundRelease, SettlementError> {
    let release = sqlx::query_as::<_, FundRelease>(
        r#"INSERT INTO fund_releases (sub_order_id, order_id, store_id,
        amount, shipping_price, commission, percentage_fee, flat_fee,
        store_tier, verification_status, business_days_required, delivery_required, buyer_protection_days,
        require_buyer_protection, require_dispute_checks,
        payment_cleared, verification_complete, scheduled_release_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, 1, $16, $17) RETURNING *"#,
    )
    .bind(&new.sub_order_id)
    .bind(&new.order_id)
    .bind(&new.store_id)
    .bind(new.settlement.amount)
    .bind(new.settlement.shipping_price)
    .bind(new.settlement.commission)
    .bind(new.settlement.percentage_fee)
    .bind(new.settlement.flat_fee)
    .bind(new.rules.store_tier)
    .bind(new.rules.verification_status)
    .bind(new.rules.business_days_required)
    .bind(new.rules.delivery_required)
    .bind(new.rules.buyer_protection_days)
    .bind(new.rules.require_buyer_protection)
    .bind(new.rules.require_dispute_checks)
    .bind(new.verification_complete)
    .bind(new.scheduled_release_time)
    .fetch_one(conn)
    .await?;
    debug!(
        "📝️ Created release for {} worth {} (commission {}), scheduled {}",
        release.sub_order_id,
        release.settlement.payout(),
        release.settlement.commission,
        release.scheduled_release_time
    );
    Ok(release)
}

pub async fn fetch_release(
    sub_order_id: &SubOrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, SettlementError> {
    let release = sqlx::query_as::<_, FundRelease>("SELECT * FROM fund_releases WHERE sub_order_id = $1")
        .bind(sub_order_id)
        .fetch_optional(conn)
        .await?;
    Ok(release)
}

pub async fn fetch_releases_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<FundRelease>, SettlementError> {
    let releases = sqlx::query_as::<_, FundRelease>("SELECT * FROM fund_releases WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(releases)
}

/// Flips the named condition flags to satisfied. Flags only ever move from 0 to 1; this never
/// writes a 0. `flags` must come from the fixed condition column set, it is spliced into SQL.
pub(crate) async fn set_condition_flags(
    sub_order_id: &SubOrderId,
    flags: &[&'static str],
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    if flags.is_empty() {
        return Ok(());
    }
    let mut builder = QueryBuilder::new("UPDATE fund_releases SET updated_at = CURRENT_TIMESTAMP");
    for flag in flags {
        builder.push(format!(", {flag} = 1"));
    }
    builder.push(" WHERE sub_order_id = ").push_bind(sub_order_id);
    builder.build().execute(conn).await?;
    debug!("🔄️✅️ Conditions now satisfied on {sub_order_id}: {}", flags.join(", "));
    Ok(())
}

/// Marks delivery confirmed on the sub-order's release, if it has not paid out yet.
pub(crate) async fn set_delivery_confirmed(
    sub_order_id: &SubOrderId,
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    sqlx::query(
        r#"UPDATE fund_releases SET delivery_confirmed = 1, updated_at = CURRENT_TIMESTAMP
        WHERE sub_order_id = $1 AND delivery_confirmed = 0 AND status IN ('Pending', 'Ready', 'Failed')"#,
    )
    .bind(sub_order_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// `Pending -> Ready`, taken when every required condition holds and the schedule has passed.
pub(crate) async fn mark_ready(
    sub_order_id: &SubOrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, SettlementError> {
    let release = sqlx::query_as::<_, FundRelease>(
        r#"UPDATE fund_releases SET status = 'Ready', updated_at = CURRENT_TIMESTAMP
        WHERE sub_order_id = $1 AND status = 'Pending' RETURNING *"#,
    )
    .bind(sub_order_id)
    .fetch_optional(conn)
    .await?;
    Ok(release)
}

/// Claims a release for payout. Exactly one concurrent caller gets the row; everyone else sees
/// `None` and diagnoses from the live status.
pub(crate) async fn begin_processing(
    sub_order_id: &SubOrderId,
    from: &[ReleaseStatus],
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, SettlementError> {
    let from_list = from.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(", ");
    let q = format!(
        "UPDATE fund_releases SET status = 'Processing', updated_at = CURRENT_TIMESTAMP WHERE sub_order_id = $1 AND \
         status IN ({from_list}) RETURNING *"
    );
    let release = sqlx::query_as::<_, FundRelease>(&q).bind(sub_order_id).fetch_optional(conn).await?;
    Ok(release)
}

pub(crate) async fn mark_released(
    sub_order_id: &SubOrderId,
    trigger: ReleaseTrigger,
    actor: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, SettlementError> {
    let release = sqlx::query_as::<_, FundRelease>(
        r#"UPDATE fund_releases SET status = 'Released', released_at = CURRENT_TIMESTAMP, trigger_kind = $1,
        released_by = $2, failure_reason = NULL, updated_at = CURRENT_TIMESTAMP
        WHERE sub_order_id = $3 AND status = 'Processing' RETURNING *"#,
    )
    .bind(trigger)
    .bind(actor)
    .bind(sub_order_id)
    .fetch_optional(conn)
    .await?;
    Ok(release)
}

/// `Pending | Ready -> Failed` with the reported reason.
pub(crate) async fn mark_failed(
    sub_order_id: &SubOrderId,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, SettlementError> {
    let release = sqlx::query_as::<_, FundRelease>(
        r#"UPDATE fund_releases SET status = 'Failed', failure_reason = $1, updated_at = CURRENT_TIMESTAMP
        WHERE sub_order_id = $2 AND status IN ('Pending', 'Ready') RETURNING *"#,
    )
    .bind(reason)
    .bind(sub_order_id)
    .fetch_optional(conn)
    .await?;
    Ok(release)
}

/// `Failed -> Ready` for another payout attempt. The failure reason is cleared.
pub(crate) async fn mark_retried(
    sub_order_id: &SubOrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, SettlementError> {
    let release = sqlx::query_as::<_, FundRelease>(
        r#"UPDATE fund_releases SET status = 'Ready', failure_reason = NULL, updated_at = CURRENT_TIMESTAMP
        WHERE sub_order_id = $1 AND status = 'Failed' RETURNING *"#,
    )
    .bind(sub_order_id)
    .fetch_optional(conn)
    .await?;
    Ok(release)
}

pub(crate) async fn mark_reversed(
    sub_order_id: &SubOrderId,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, SettlementError> {
    let release = sqlx::query_as::<_, FundRelease>(
        r#"UPDATE fund_releases SET status = 'Reversed', reversed_at = CURRENT_TIMESTAMP, reversal_reason = $1,
        updated_at = CURRENT_TIMESTAMP
        WHERE sub_order_id = $2 AND status = 'Released' RETURNING *"#,
    )
    .bind(reason)
    .bind(sub_order_id)
    .fetch_optional(conn)
    .await?;
    Ok(release)
}

/// Releases that are `Ready` and due, oldest schedule first. A pure read.
pub async fn ready_releases(
    now: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<FundRelease>, SettlementError> {
    let releases = sqlx::query_as::<_, FundRelease>(
        r#"SELECT * FROM fund_releases WHERE status = 'Ready' AND datetime(scheduled_release_time) <= datetime($1)
        ORDER BY scheduled_release_time ASC LIMIT $2"#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(releases)
}

/// `Pending` releases whose scheduled time has passed, i.e. candidates for evaluation.
pub async fn due_pending_releases(
    now: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<FundRelease>, SettlementError> {
    let releases = sqlx::query_as::<_, FundRelease>(
        r#"SELECT * FROM fund_releases WHERE status = 'Pending' AND datetime(scheduled_release_time) <= datetime($1)
        ORDER BY scheduled_release_time ASC LIMIT $2"#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(releases)
}

/// The credit this release produced, if it has one. Used to answer repeat release calls with the
/// original outcome.
pub(crate) async fn release_credit_transaction(
    release: &FundRelease,
    conn: &mut SqliteConnection,
) -> Result<Option<WalletTransaction>, SettlementError> {
    let entry = sqlx::query_as::<_, WalletTransaction>(
        r#"SELECT * FROM wallet_transactions
        WHERE source = 'Order' AND entry_type = 'Credit' AND related_type = 'FundRelease' AND related_id = $1
        ORDER BY id DESC LIMIT 1"#,
    )
    .bind(release.sub_order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(entry)
}

pub(crate) async fn search_releases(
    query: ReleaseQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<FundRelease>, SettlementError> {
    let mut builder = QueryBuilder::new("SELECT * FROM fund_releases");
    if !query.is_empty() {
        builder.push(" WHERE ");
        let mut where_clause = builder.separated(" AND ");
        if let Some(store_id) = query.store_id {
            where_clause.push("store_id = ").push_bind_unseparated(store_id);
        }
        if let Some(order_id) = query.order_id {
            where_clause.push("order_id = ").push_bind_unseparated(order_id);
        }
        if !query.statuses.is_empty() {
            let statuses = query.statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(", ");
            where_clause.push(format!("status IN ({statuses})"));
        }
        if let Some(due_before) = query.due_before {
            where_clause
                .push("datetime(scheduled_release_time) <= datetime(")
                .push_bind_unseparated(due_before)
                .push_unseparated(")");
        }
    }
    builder.push(" ORDER BY scheduled_release_time ASC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ").push_bind(limit);
    }
    let releases = builder.build_query_as::<FundRelease>().fetch_all(conn).await?;
    Ok(releases)
}
