use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{
        ConfirmationKind,
        DeliveryStatus,
        LineItem,
        NewOrder,
        Order,
        OrderId,
        PaymentStatus,
        SubOrder,
        SubOrderId,
        SubOrderStatusEntry,
    },
    se_api::OrderQueryFilter,
    sqlite::db::stores,
    traits::SettlementError,
};

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SettlementError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_by_idempotency_key(
    key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SettlementError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE idempotency_key = $1")
        .bind(key)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Inserts an order aggregate, keyed on the idempotency key. A redelivered order returns the
/// stored row with `false` and writes nothing, whatever the redelivered payload says. The
/// boolean is `true` when this call inserted the order.
///
/// Stores referenced by the sub-orders are registered on the fly, wallets included, so an order
/// from a brand-new seller just works.
pub(crate) async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), SettlementError> {
    order.validate()?;
    if let Some(existing) = fetch_order_by_idempotency_key(&order.idempotency_key, &mut *conn).await? {
        debug!(
            "🔄️📦️ Order {} has already been recorded under idempotency key {}",
            existing.order_id, order.idempotency_key
        );
        return Ok((existing, false));
    }
    let inserted = insert_order(order, conn).await?;
    Ok((inserted, true))
}

async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, SettlementError> {
    let row = sqlx::query_as::<_, Order>(
        r#"INSERT INTO orders (order_id, idempotency_key, customer_id, buyer_name, buyer_email, shipping_address,
        memo, total_amount, placed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *"#,
    )
    .bind(&order.order_id)
    .bind(&order.idempotency_key)
    .bind(&order.customer_id)
    .bind(&order.buyer_name)
    .bind(&order.buyer_email)
    .bind(&order.shipping_address)
    .bind(&order.memo)
    .bind(order.total_amount)
    .bind(order.placed_at)
    .fetch_one(&mut *conn)
    .await?;
    for sub in &order.sub_orders {
        stores::register_store(&sub.store_id, &sub.store_id, &mut *conn).await?;
        sqlx::query(
            r#"INSERT INTO sub_orders (sub_order_id, order_id, store_id, total_amount, shipping_price)
            VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(&sub.sub_order_id)
        .bind(&order.order_id)
        .bind(&sub.store_id)
        .bind(sub.total_amount)
        .bind(sub.shipping_price)
        .execute(&mut *conn)
        .await?;
        append_status_entry(&sub.sub_order_id, DeliveryStatus::OrderPlaced, Some("order placed".to_string()), conn)
            .await?;
        for item in &sub.items {
            sqlx::query(
                r#"INSERT INTO line_items (sub_order_id, product_kind, product_id, product_name, unit_price,
                quantity, line_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            )
            .bind(&sub.sub_order_id)
            .bind(item.product.kind())
            .bind(item.product.id())
            .bind(&item.product_name)
            .bind(item.unit_price)
            .bind(item.quantity)
            .bind(item.line_total)
            .execute(&mut *conn)
            .await?;
        }
    }
    debug!("📝️ Recorded order {} with {} sub-orders", row.order_id, order.sub_orders.len());
    Ok(row)
}

/// Guarded payment transition. Returns `None` when the order is not currently in `from`, in
/// which case the caller diagnoses what actually happened.
pub(crate) async fn set_payment_status(
    order_id: &OrderId,
    from: PaymentStatus,
    to: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SettlementError> {
    let order = sqlx::query_as::<_, Order>(
        r#"UPDATE orders SET payment_status = $1, updated_at = CURRENT_TIMESTAMP
        WHERE order_id = $2 AND payment_status = $3 RETURNING *"#,
    )
    .bind(to)
    .bind(order_id)
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_sub_order(
    sub_order_id: &SubOrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<SubOrder>, SettlementError> {
    let sub = sqlx::query_as::<_, SubOrder>("SELECT * FROM sub_orders WHERE sub_order_id = $1")
        .bind(sub_order_id)
        .fetch_optional(conn)
        .await?;
    Ok(sub)
}

pub async fn sub_orders_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<SubOrder>, SettlementError> {
    let subs = sqlx::query_as::<_, SubOrder>("SELECT * FROM sub_orders WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(subs)
}

pub async fn line_items_for_sub_order(
    sub_order_id: &SubOrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<LineItem>, SettlementError> {
    let items = sqlx::query_as::<_, LineItem>("SELECT * FROM line_items WHERE sub_order_id = $1 ORDER BY id ASC")
        .bind(sub_order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

pub async fn status_history(
    sub_order_id: &SubOrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<SubOrderStatusEntry>, SettlementError> {
    let entries =
        sqlx::query_as::<_, SubOrderStatusEntry>("SELECT * FROM sub_order_status_log WHERE sub_order_id = $1 ORDER BY id ASC")
            .bind(sub_order_id)
            .fetch_all(conn)
            .await?;
    Ok(entries)
}

pub(crate) async fn append_status_entry(
    sub_order_id: &SubOrderId,
    status: DeliveryStatus,
    note: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    sqlx::query("INSERT INTO sub_order_status_log (sub_order_id, status, note) VALUES ($1, $2, $3)")
        .bind(sub_order_id)
        .bind(status)
        .bind(note)
        .execute(conn)
        .await?;
    Ok(())
}

/// Moves fulfilment forward and appends exactly one history entry. A repeat of the current
/// status is a no-op for webhook redeliveries; moving backwards is rejected outright.
pub(crate) async fn update_delivery_status(
    sub_order_id: &SubOrderId,
    status: DeliveryStatus,
    note: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<SubOrder, SettlementError> {
    let current = fetch_sub_order(sub_order_id, &mut *conn)
        .await?
        .ok_or_else(|| SettlementError::SubOrderNotFound(sub_order_id.clone()))?;
    if status == current.delivery_status {
        return Ok(current);
    }
    if status.rank() < current.delivery_status.rank() {
        return Err(SettlementError::invalid_transition(
            format!("Sub-order {sub_order_id}"),
            current.delivery_status,
            status,
        ));
    }
    let delivered_at = status.is_delivered().then(Utc::now);
    let updated = sqlx::query_as::<_, SubOrder>(
        r#"UPDATE sub_orders SET delivery_status = $1, delivered_at = COALESCE($2, delivered_at),
        updated_at = CURRENT_TIMESTAMP
        WHERE sub_order_id = $3 AND delivery_status = $4 RETURNING *"#,
    )
    .bind(status)
    .bind(delivered_at)
    .bind(sub_order_id)
    .bind(current.delivery_status)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| {
        SettlementError::ConcurrencyConflict(format!("sub-order {sub_order_id} was updated concurrently"))
    })?;
    append_status_entry(sub_order_id, status, note, conn).await?;
    Ok(updated)
}

/// Records delivery confirmation exactly once. The guard on `customer_confirmed` means that when
/// the customer and the auto-confirm sweep race, whichever lands first wins and the other sees
/// `false`.
pub(crate) async fn confirm_delivery(
    sub_order_id: &SubOrderId,
    kind: ConfirmationKind,
    conn: &mut SqliteConnection,
) -> Result<(SubOrder, bool), SettlementError> {
    let updated = sqlx::query_as::<_, SubOrder>(
        r#"UPDATE sub_orders SET customer_confirmed = 1, confirmation_kind = $1, confirmed_at = CURRENT_TIMESTAMP,
        updated_at = CURRENT_TIMESTAMP
        WHERE sub_order_id = $2 AND customer_confirmed = 0 AND delivery_status = 'Delivered' RETURNING *"#,
    )
    .bind(kind)
    .bind(sub_order_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(sub) => Ok((sub, true)),
        None => {
            let sub = fetch_sub_order(sub_order_id, conn)
                .await?
                .ok_or_else(|| SettlementError::SubOrderNotFound(sub_order_id.clone()))?;
            if sub.customer_confirmed {
                Ok((sub, false))
            } else {
                Err(SettlementError::invalid_transition(
                    format!("Sub-order {sub_order_id}"),
                    sub.delivery_status,
                    "Confirmed",
                ))
            }
        },
    }
}

/// Delivered sub-orders whose confirmation grace period lapsed before `cutoff` with no word from
/// the customer. These are the auto-confirm sweep's candidates.
pub(crate) async fn unconfirmed_delivered_before(
    cutoff: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<SubOrder>, SettlementError> {
    let subs = sqlx::query_as::<_, SubOrder>(
        r#"SELECT * FROM sub_orders WHERE delivery_status = 'Delivered' AND customer_confirmed = 0
        AND delivered_at IS NOT NULL AND datetime(delivered_at) <= datetime($1)
        ORDER BY delivered_at ASC LIMIT $2"#,
    )
    .bind(cutoff)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(subs)
}

pub(crate) async fn search_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SettlementError> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders");
    if !query.is_empty() {
        builder.push(" WHERE ");
        let mut where_clause = builder.separated(" AND ");
        if let Some(customer_id) = query.customer_id {
            where_clause.push("customer_id = ").push_bind_unseparated(customer_id);
        }
        if let Some(status) = query.payment_status {
            where_clause.push("payment_status = ").push_bind_unseparated(status);
        }
        if let Some(since) = query.since {
            where_clause.push("datetime(placed_at) >= datetime(").push_bind_unseparated(since).push_unseparated(")");
        }
        if let Some(until) = query.until {
            where_clause.push("datetime(placed_at) <= datetime(").push_bind_unseparated(until).push_unseparated(")");
        }
    }
    builder.push(" ORDER BY placed_at DESC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ").push_bind(limit);
    }
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    Ok(orders)
}
