use std::sync::{atomic::AtomicI32, Arc};

use chrono::{Duration, Utc};
use log::*;
use msl_common::Money;
use settlement_engine::{
    db_types::{BankDetails, ConfirmationKind, DeliveryStatus, NewLineItem, NewOrder, NewSubOrder, OrderId, ProductRef, SubOrderId, TransactionSource},
    events::{AuditEvent, EventHandlers, EventHooks},
    OrderFlowApi,
    ReleaseApi,
    SettlementDatabase,
    SqliteDatabase,
    WalletLedger,
    WithdrawalApi,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::runtime::Runtime;

use crate::support::prepare_env::{prepare_test_env, random_db_path};

mod support;

async fn setup() -> (String, SqliteDatabase) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    (url, db)
}

async fn tear_down(mut db: SqliteDatabase, url: &str) {
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(url).await.unwrap();
}

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(std::sync::atomic::Ordering::Relaxed)
    }
}

fn paid_order(order_id: &str, store_id: &str, total: i64) -> NewOrder {
    let item = NewLineItem {
        product: ProductRef::Physical("SKU-0091".to_string()),
        product_name: "Adire throw pillow".to_string(),
        unit_price: Money::from(total),
        quantity: 1,
        line_total: Money::from(total),
    };
    let sub = NewSubOrder {
        sub_order_id: SubOrderId::new(format!("{order_id}-1")),
        store_id: store_id.to_string(),
        total_amount: Money::from(total),
        shipping_price: Money::default(),
        items: vec![item],
    };
    NewOrder {
        order_id: OrderId::new(order_id),
        idempotency_key: format!("checkout-{order_id}"),
        customer_id: "cust-40".to_string(),
        buyer_name: "Tunde Bakare".to_string(),
        buyer_email: "tunde@example.com".to_string(),
        shipping_address: "3 Allen Avenue, Ikeja".to_string(),
        memo: None,
        total_amount: Money::from(total),
        placed_at: Utc::now() - Duration::days(21),
        sub_orders: vec![sub],
    }
}

#[test]
fn on_order_paid() {
    let rt = Runtime::new().unwrap();
    let event = HookCalled::default();
    let event_copy = event.clone();
    rt.block_on(async move {
        let (url, db) = setup().await;
        let mut hooks = EventHooks::default();
        hooks.on_order_paid(move |ev| {
            info!("🪝️ {ev:?}");
            event_copy.called();
            Box::pin(async {})
        });
        let handlers = EventHandlers::new(10, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;
        let api = OrderFlowApi::new(db.clone(), producers);
        let _ = api.register_store("store-400", "Ikeja Crafts").await.expect("Error registering store");
        let _ = api.process_new_order(paid_order("order-400", "store-400", 40_000)).await.expect("Error inserting order");
        let _ = api.process_payment_cleared(&OrderId::new("order-400")).await.expect("Error clearing payment");
        let _ = api.process_new_order(paid_order("order-401", "store-400", 25_000)).await.expect("Error inserting order");
        let _ = api.process_payment_cleared(&OrderId::new("order-401")).await.expect("Error clearing payment");
        tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;
        tear_down(db, &url).await;
    });
    assert_eq!(event.count(), 2);
    info!("🪝️ test complete");
}

#[test]
fn on_funds_released_and_reversed() {
    let rt = Runtime::new().unwrap();
    let released = HookCalled::default();
    let released_copy = released.clone();
    let reversed = HookCalled::default();
    let reversed_copy = reversed.clone();
    rt.block_on(async move {
        let (url, db) = setup().await;
        let mut hooks = EventHooks::default();
        hooks
            .on_funds_released(move |ev| {
                info!("🪝️ {ev:?}");
                released_copy.called();
                Box::pin(async {})
            })
            .on_release_reversed(move |ev| {
                info!("🪝️ {ev:?}");
                reversed_copy.called();
                Box::pin(async {})
            });
        let handlers = EventHandlers::new(10, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;
        let orders = OrderFlowApi::new(db.clone(), producers.clone());
        let releases = ReleaseApi::new(db.clone(), producers);
        let _ = orders.register_store("store-410", "Aba Shoemakers").await.expect("Error registering store");
        let _ = orders.process_new_order(paid_order("order-410", "store-410", 60_000)).await.expect("Error inserting order");
        let _ = orders.process_payment_cleared(&OrderId::new("order-410")).await.expect("Error clearing payment");
        let sub_id = SubOrderId::new("order-410-1");
        let _ = orders
            .update_delivery_status(&sub_id, DeliveryStatus::Delivered, None)
            .await
            .expect("Error marking delivered");
        let _ = orders.confirm_delivery(&sub_id, ConfirmationKind::Manual).await.expect("Error confirming delivery");
        let _ = releases.evaluate(&sub_id).await.expect("Error evaluating release");
        let _ = releases.release(&sub_id, "ops@marketplace.example").await.expect("Error releasing funds");
        // replaying the release reports the original payout without firing the hook again
        let _ = releases.release(&sub_id, "ops@marketplace.example").await.expect("Error replaying release");
        let _ = releases
            .reverse(&sub_id, "fraudulent delivery confirmation", "ops@marketplace.example")
            .await
            .expect("Error reversing release");
        tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;
        tear_down(db, &url).await;
    });
    assert_eq!(released.count(), 1);
    assert_eq!(reversed.count(), 1);
    info!("🪝️ test complete");
}

#[test]
fn on_withdrawal_adjudication() {
    let rt = Runtime::new().unwrap();
    let approved = HookCalled::default();
    let approved_copy = approved.clone();
    let rejected = HookCalled::default();
    let rejected_copy = rejected.clone();
    rt.block_on(async move {
        let (url, db) = setup().await;
        let mut hooks = EventHooks::default();
        hooks
            .on_withdrawal_approved(move |ev| {
                info!("🪝️ {ev:?}");
                approved_copy.called();
                Box::pin(async {})
            })
            .on_withdrawal_rejected(move |ev| {
                info!("🪝️ {ev:?}");
                rejected_copy.called();
                Box::pin(async {})
            });
        let handlers = EventHandlers::new(10, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;
        let api = WithdrawalApi::new(db.clone(), producers);
        let _ = db.fetch_or_create_wallet("store-420").await.expect("Error creating wallet");
        let _ = db
            .credit_wallet("store-420", Money::from(100_000), TransactionSource::Adjustment, None, None)
            .await
            .expect("Error funding wallet");
        let bank = BankDetails {
            bank_name: "GTBank".to_string(),
            account_number: "0456789012".to_string(),
            account_name: "Aba Shoemakers Ltd".to_string(),
        };
        let (first, _) = api
            .create("store-420", Money::from(30_000), bank.clone(), "store-420")
            .await
            .expect("Error creating withdrawal");
        let (second, _) = api
            .create("store-420", Money::from(20_000), bank, "store-420")
            .await
            .expect("Error creating withdrawal");
        let _ = api.approve(&first.request_ref, "FT-2025-120045", "finance").await.expect("Error approving withdrawal");
        let _ = api.reject(&second.request_ref, "bank details mismatch", "finance").await.expect("Error rejecting withdrawal");
        tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;
        tear_down(db, &url).await;
    });
    assert_eq!(approved.count(), 1);
    assert_eq!(rejected.count(), 1);
    info!("🪝️ test complete");
}

// Audit events come from the admin endpoints rather than the engine APIs, so this exercises the
// channel plumbing directly.
#[test]
fn on_audit() {
    let rt = Runtime::new().unwrap();
    let audited = HookCalled::default();
    let audited_copy = audited.clone();
    rt.block_on(async move {
        let mut hooks = EventHooks::default();
        hooks.on_audit(move |ev| {
            info!("🪝️ {ev:?}");
            assert_eq!(ev.admin, "finance");
            assert_eq!(ev.before.as_deref(), Some("Pending"));
            audited_copy.called();
            Box::pin(async {})
        });
        let handlers = EventHandlers::new(10, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;
        let event = AuditEvent::new(
            "finance",
            "approve_withdrawal",
            "withdrawal:WR-000042".to_string(),
            Some("Pending".to_string()),
            "Approved".to_string(),
        );
        for emitter in &producers.audit_producer {
            emitter.publish_event(event.clone()).await;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;
    });
    assert_eq!(audited.count(), 1);
    info!("🪝️ test complete");
}
