use log::debug;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewWithdrawal, WithdrawalRequest, WithdrawalStatus, WithdrawalStatusEntry},
    se_api::WithdrawalQueryFilter,
    traits::WithdrawalError,
};

pub(crate) async fn insert_request(
    new: &NewWithdrawal,
    request_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<WithdrawalRequest, WithdrawalError> {
    let request = sqlx::query_as::<_, WithdrawalRequest>(
        r#"INSERT INTO withdrawal_requests (request_ref, store_id, requested_amount, processing_fee, net_amount,
        bank_name, account_number, account_name)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *"#,
    )
    .bind(request_ref)
    .bind(&new.store_id)
    .bind(new.requested_amount)
    .bind(new.processing_fee)
    .bind(new.net_amount)
    .bind(&new.bank_details.bank_name)
    .bind(&new.bank_details.account_number)
    .bind(&new.bank_details.account_name)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Created withdrawal {request_ref} for {} ({})", new.store_id, new.requested_amount);
    Ok(request)
}

pub async fn fetch_by_ref(
    request_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WithdrawalRequest>, WithdrawalError> {
    let request = sqlx::query_as::<_, WithdrawalRequest>("SELECT * FROM withdrawal_requests WHERE request_ref = $1")
        .bind(request_ref)
        .fetch_optional(conn)
        .await?;
    Ok(request)
}

/// Appends one history row. Called in the same transaction as every status change, which is what
/// keeps the request's status equal to the head of its history.
pub(crate) async fn append_status(
    withdrawal_id: i64,
    status: WithdrawalStatus,
    actor: &str,
    note: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<WithdrawalStatusEntry, WithdrawalError> {
    let entry = sqlx::query_as::<_, WithdrawalStatusEntry>(
        "INSERT INTO withdrawal_status_log (withdrawal_id, status, actor, note) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(withdrawal_id)
    .bind(status)
    .bind(actor)
    .bind(note)
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

pub async fn history(
    withdrawal_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<WithdrawalStatusEntry>, WithdrawalError> {
    let entries = sqlx::query_as::<_, WithdrawalStatusEntry>(
        "SELECT * FROM withdrawal_status_log WHERE withdrawal_id = $1 ORDER BY id ASC",
    )
    .bind(withdrawal_id)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}

/// Guarded status transition. When concurrent admins race, the row moves exactly once; the loser
/// gets `None` and diagnoses from the live row.
pub(crate) async fn update_status(
    request_ref: &str,
    from: &[WithdrawalStatus],
    to: WithdrawalStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<WithdrawalRequest>, WithdrawalError> {
    let from_list = from.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(", ");
    let q = format!(
        "UPDATE withdrawal_requests SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE request_ref = $2 AND \
         status IN ({from_list}) RETURNING *"
    );
    let request = sqlx::query_as::<_, WithdrawalRequest>(&q).bind(to).bind(request_ref).fetch_optional(conn).await?;
    Ok(request)
}

/// `Pending | UnderReview -> Approved`, recording the bank transaction reference.
pub(crate) async fn approve(
    request_ref: &str,
    transaction_reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WithdrawalRequest>, WithdrawalError> {
    let request = sqlx::query_as::<_, WithdrawalRequest>(
        r#"UPDATE withdrawal_requests SET status = 'Approved', transaction_reference = $1,
        updated_at = CURRENT_TIMESTAMP
        WHERE request_ref = $2 AND status IN ('Pending', 'UnderReview') RETURNING *"#,
    )
    .bind(transaction_reference)
    .bind(request_ref)
    .fetch_optional(conn)
    .await?;
    Ok(request)
}

/// Rejects any request that has not completed yet, recording the reason. The compensating
/// credit is the caller's job, in the same transaction.
pub(crate) async fn reject(
    request_ref: &str,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WithdrawalRequest>, WithdrawalError> {
    let request = sqlx::query_as::<_, WithdrawalRequest>(
        r#"UPDATE withdrawal_requests SET status = 'Rejected', rejection_reason = $1, updated_at = CURRENT_TIMESTAMP
        WHERE request_ref = $2 AND status IN ('Pending', 'UnderReview', 'Approved', 'Processing', 'Failed')
        RETURNING *"#,
    )
    .bind(reason)
    .bind(request_ref)
    .fetch_optional(conn)
    .await?;
    Ok(request)
}

pub(crate) async fn search(
    query: WithdrawalQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<WithdrawalRequest>, WithdrawalError> {
    let mut builder = QueryBuilder::new("SELECT * FROM withdrawal_requests");
    if !query.is_empty() {
        builder.push(" WHERE ");
        let mut where_clause = builder.separated(" AND ");
        if let Some(store_id) = query.store_id {
            where_clause.push("store_id = ").push_bind_unseparated(store_id);
        }
        if !query.statuses.is_empty() {
            let statuses = query.statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(", ");
            where_clause.push(format!("status IN ({statuses})"));
        }
        if let Some(since) = query.since {
            where_clause.push("datetime(created_at) >= datetime(").push_bind_unseparated(since).push_unseparated(")");
        }
    }
    builder.push(" ORDER BY id DESC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ").push_bind(limit);
    }
    let requests = builder.build_query_as::<WithdrawalRequest>().fetch_all(conn).await?;
    Ok(requests)
}
