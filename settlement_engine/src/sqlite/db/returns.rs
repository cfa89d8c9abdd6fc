use log::debug;
use msl_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Dispute, DisputeKind, ReturnRequest, ReturnStatus, SubOrderId},
    traits::SettlementError,
};

/// Which states a return may move to `to` from. `Requested` is entry-only.
pub(crate) fn allowed_sources(to: ReturnStatus) -> &'static [ReturnStatus] {
    match to {
        ReturnStatus::Requested => &[],
        ReturnStatus::Approved | ReturnStatus::Rejected => &[ReturnStatus::Requested],
        ReturnStatus::InTransit => &[ReturnStatus::Approved],
        ReturnStatus::Received => &[ReturnStatus::InTransit],
        ReturnStatus::Refunded => &[ReturnStatus::Received],
    }
}

pub(crate) async fn insert_return(
    sub_order_id: &SubOrderId,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<ReturnRequest, SettlementError> {
    if active_return_count(sub_order_id, &mut *conn).await? > 0 {
        return Err(SettlementError::ValidationError(format!(
            "sub-order {sub_order_id} already has an active return"
        )));
    }
    let request =
        sqlx::query_as::<_, ReturnRequest>("INSERT INTO returns (sub_order_id, reason) VALUES ($1, $2) RETURNING *")
            .bind(sub_order_id)
            .bind(reason)
            .fetch_one(conn)
            .await?;
    debug!("🛒️ Return {} opened on {sub_order_id}", request.id);
    Ok(request)
}

pub async fn fetch_return(id: i64, conn: &mut SqliteConnection) -> Result<Option<ReturnRequest>, SettlementError> {
    let request = sqlx::query_as::<_, ReturnRequest>("SELECT * FROM returns WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(request)
}

pub async fn returns_for_sub_order(
    sub_order_id: &SubOrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReturnRequest>, SettlementError> {
    let requests = sqlx::query_as::<_, ReturnRequest>("SELECT * FROM returns WHERE sub_order_id = $1 ORDER BY id ASC")
        .bind(sub_order_id)
        .fetch_all(conn)
        .await?;
    Ok(requests)
}

/// Guarded return transition. `None` means the return was not in a state `to` can be reached
/// from.
pub(crate) async fn set_return_status(
    id: i64,
    to: ReturnStatus,
    refund_amount: Option<Money>,
    conn: &mut SqliteConnection,
) -> Result<Option<ReturnRequest>, SettlementError> {
    let sources = allowed_sources(to);
    if sources.is_empty() {
        return Ok(None);
    }
    let from_list = sources.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(", ");
    let q = format!(
        "UPDATE returns SET status = $1, refund_amount = COALESCE($2, refund_amount), updated_at = \
         CURRENT_TIMESTAMP WHERE id = $3 AND status IN ({from_list}) RETURNING *"
    );
    let request = sqlx::query_as::<_, ReturnRequest>(&q)
        .bind(to)
        .bind(refund_amount)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(request)
}

/// Returns that still block their sub-order's release.
pub(crate) async fn active_return_count(
    sub_order_id: &SubOrderId,
    conn: &mut SqliteConnection,
) -> Result<i64, SettlementError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM returns WHERE sub_order_id = $1 AND status NOT IN ('Rejected', 'Refunded')",
    )
    .bind(sub_order_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

pub(crate) async fn insert_dispute(
    sub_order_id: &SubOrderId,
    kind: DisputeKind,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Dispute, SettlementError> {
    let dispute =
        sqlx::query_as::<_, Dispute>("INSERT INTO disputes (sub_order_id, kind, reason) VALUES ($1, $2, $3) RETURNING *")
            .bind(sub_order_id)
            .bind(kind)
            .bind(reason)
            .fetch_one(conn)
            .await?;
    debug!("⚖️ {kind} {} opened on {sub_order_id}", dispute.id);
    Ok(dispute)
}

pub async fn fetch_dispute(id: i64, conn: &mut SqliteConnection) -> Result<Option<Dispute>, SettlementError> {
    let dispute =
        sqlx::query_as::<_, Dispute>("SELECT * FROM disputes WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(dispute)
}

pub async fn disputes_for_sub_order(
    sub_order_id: &SubOrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Dispute>, SettlementError> {
    let disputes = sqlx::query_as::<_, Dispute>("SELECT * FROM disputes WHERE sub_order_id = $1 ORDER BY id ASC")
        .bind(sub_order_id)
        .fetch_all(conn)
        .await?;
    Ok(disputes)
}

pub(crate) async fn resolve_dispute(id: i64, conn: &mut SqliteConnection) -> Result<Option<Dispute>, SettlementError> {
    let dispute = sqlx::query_as::<_, Dispute>(
        r#"UPDATE disputes SET status = 'Resolved', resolved_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND status = 'Open' RETURNING *"#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(dispute)
}

pub(crate) async fn open_dispute_count(
    sub_order_id: &SubOrderId,
    kind: DisputeKind,
    conn: &mut SqliteConnection,
) -> Result<i64, SettlementError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM disputes WHERE sub_order_id = $1 AND kind = $2 AND status = 'Open'")
            .bind(sub_order_id)
            .bind(kind)
            .fetch_one(conn)
            .await?;
    Ok(count)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn return_transitions_follow_the_lifecycle() {
        assert_eq!(allowed_sources(ReturnStatus::Approved), &[ReturnStatus::Requested]);
        assert_eq!(allowed_sources(ReturnStatus::Rejected), &[ReturnStatus::Requested]);
        assert_eq!(allowed_sources(ReturnStatus::InTransit), &[ReturnStatus::Approved]);
        assert_eq!(allowed_sources(ReturnStatus::Received), &[ReturnStatus::InTransit]);
        assert_eq!(allowed_sources(ReturnStatus::Refunded), &[ReturnStatus::Received]);
        assert!(allowed_sources(ReturnStatus::Requested).is_empty());
    }
}
