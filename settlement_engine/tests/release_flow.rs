use chrono::{DateTime, Duration, Utc};
use log::*;
use msl_common::Money;
use settlement_engine::{
    db_types::{
        ConfirmationKind,
        DeliveryStatus,
        DisputeKind,
        NewLineItem,
        NewOrder,
        NewSubOrder,
        OrderId,
        PaymentStatus,
        ProductRef,
        ReleaseStatus,
        ReleaseTrigger,
        ReturnStatus,
        SubOrderId,
        TransactionSource,
    },
    events::EventProducers,
    helpers::add_business_days,
    LedgerManagement,
    OrderFlowApi,
    ReleaseApi,
    ReleaseOutcome,
    SettlementDatabase,
    SettlementError,
    SqliteDatabase,
    WalletLedger,
    WalletLedgerError,
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

fn single_store_order(order_id: &str, store_id: &str, total: i64, shipping: i64, placed_at: DateTime<Utc>) -> NewOrder {
    let item = NewLineItem {
        product: ProductRef::Physical("SKU-0017".to_string()),
        product_name: "Handwoven basket".to_string(),
        unit_price: Money::from(total),
        quantity: 1,
        line_total: Money::from(total),
    };
    let sub = NewSubOrder {
        sub_order_id: SubOrderId::new(format!("{order_id}-1")),
        store_id: store_id.to_string(),
        total_amount: Money::from(total),
        shipping_price: Money::from(shipping),
        items: vec![item],
    };
    NewOrder {
        order_id: OrderId::new(order_id),
        idempotency_key: format!("checkout-{order_id}"),
        customer_id: "cust-11".to_string(),
        buyer_name: "Amina Yusuf".to_string(),
        buyer_email: "amina@example.com".to_string(),
        shipping_address: "14 Marina Road, Lagos".to_string(),
        memo: None,
        total_amount: Money::from(total + shipping),
        placed_at,
        sub_orders: vec![sub],
    }
}

/// Drives a freshly placed order all the way to a `Ready` release: payment, delivery,
/// confirmation, evaluation.
async fn make_ready(api: &OrderFlowApi<SqliteDatabase>, releases: &ReleaseApi<SqliteDatabase>, order: NewOrder) -> SubOrderId {
    let sub_id = order.sub_orders[0].sub_order_id.clone();
    let order_id = order.order_id.clone();
    let _ = api.process_new_order(order).await.expect("Error inserting order");
    let _ = api.process_payment_cleared(&order_id).await.expect("Error clearing payment");
    let _ = api
        .update_delivery_status(&sub_id, DeliveryStatus::Delivered, None)
        .await
        .expect("Error marking delivered");
    let _ = api.confirm_delivery(&sub_id, ConfirmationKind::Manual).await.expect("Error confirming delivery");
    let outcome = releases.evaluate(&sub_id).await.expect("Error evaluating release");
    assert!(outcome.became_ready, "release for {sub_id} should have become ready");
    sub_id
}

#[test]
fn payment_clearance_escrows_the_settlement() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-200", "Kano Leatherworks").await.expect("Error registering store");
        let placed_at = Utc::now();
        let order = single_store_order("order-200", "store-200", 200_000, 5_000, placed_at);
        let (_, inserted) = api.process_new_order(order).await.expect("Error inserting order");
        assert!(inserted);
        let (order, releases) =
            api.process_payment_cleared(&OrderId::new("order-200")).await.expect("Error clearing payment");
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(releases.len(), 1);
        let release = &releases[0];
        assert_eq!(release.status, ReleaseStatus::Pending);
        // unverified Standard tier: 7.5% + 1% surcharge on 200000, plus the ₦100 flat fee
        assert_eq!(release.settlement.commission, Money::from(27_000));
        assert_eq!(release.settlement.amount, Money::from(173_000));
        assert_eq!(release.settlement.payout(), Money::from(178_000));
        assert_eq!(release.settlement.percentage_fee, 850);
        assert!(release.conditions.payment_cleared);
        assert!(!release.conditions.delivery_confirmed);
        assert_eq!(release.rules.business_days_required, 7);
        let expected = add_business_days(placed_at, 7, &[]);
        assert_eq!(release.scheduled_release_time.date_naive(), expected.date_naive());
        assert!(release.scheduled_release_time > placed_at);
        // the payout is escrowed on pending, not spendable
        let wallet = db.fetch_wallet("store-200").await.expect("Error fetching wallet").unwrap();
        assert!(wallet.balance.is_zero());
        assert_eq!(wallet.pending, Money::from(178_000));
        // clearing the same payment again changes nothing
        let (_, replayed) =
            api.process_payment_cleared(&OrderId::new("order-200")).await.expect("Error replaying payment");
        assert_eq!(replayed.len(), 1);
        let wallet = db.fetch_wallet("store-200").await.expect("Error fetching wallet").unwrap();
        assert_eq!(wallet.pending, Money::from(178_000));
        tear_down(db, &url).await;
    });
}

#[test]
fn orders_replay_idempotently_on_their_key() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-201", "Jos Ceramics").await.expect("Error registering store");
        let order = single_store_order("order-201", "store-201", 60_000, 1_500, Utc::now());
        let (first, inserted) = api.process_new_order(order.clone()).await.expect("Error inserting order");
        assert!(inserted);
        let (replay, inserted) = api.process_new_order(order).await.expect("Error replaying order");
        assert!(!inserted);
        assert_eq!(replay.id, first.id);
        // a redelivery with different numbers but the same key still returns the original
        let mut tampered = single_store_order("order-201X", "store-201", 75_000, 1_500, Utc::now());
        tampered.idempotency_key = "checkout-order-201".to_string();
        let (replay, inserted) = api.process_new_order(tampered).await.expect("Error replaying order");
        assert!(!inserted);
        assert_eq!(replay.id, first.id);
        assert_eq!(replay.total_amount, Money::from(61_500));
        let found = db
            .fetch_order_by_idempotency_key("checkout-order-201")
            .await
            .expect("Error fetching by key")
            .expect("Order should exist");
        assert_eq!(found.id, first.id);
        tear_down(db, &url).await;
    });
}

#[test]
fn malformed_order_aggregates_are_rejected() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-202", "Aba Shoes").await.expect("Error registering store");
        let mut order = single_store_order("order-202", "store-202", 60_000, 1_500, Utc::now());
        // order total no longer equals the sum of its sub-orders
        order.total_amount = Money::from(99_999);
        let err = api.process_new_order(order).await.expect_err("Mismatched totals should be rejected");
        assert!(matches!(err, SettlementError::InvalidOrder(_)));
        tear_down(db, &url).await;
    });
}

#[test]
fn a_status_check_moves_a_due_release_to_ready() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-203", "Ibadan Textiles").await.expect("Error registering store");

        // placed three weeks ago, so the hold has long lapsed
        let placed_at = Utc::now() - Duration::days(21);
        let order = single_store_order("order-203", "store-203", 80_000, 2_000, placed_at);
        let sub_id = order.sub_orders[0].sub_order_id.clone();
        let _ = api.process_new_order(order).await.expect("Error inserting order");
        let _ = api.process_payment_cleared(&OrderId::new("order-203")).await.expect("Error clearing payment");

        // due but undelivered: checking the status does not make it ready
        let outcome = releases.evaluate(&sub_id).await.expect("Error evaluating release");
        assert!(!outcome.became_ready);
        assert_eq!(outcome.release.status, ReleaseStatus::Pending);

        let _ = api
            .update_delivery_status(&sub_id, DeliveryStatus::Shipped, Some("waybill 8812".to_string()))
            .await
            .expect("Error marking shipped");
        let _ = api
            .update_delivery_status(&sub_id, DeliveryStatus::Delivered, None)
            .await
            .expect("Error marking delivered");
        let (_, confirmed) =
            api.confirm_delivery(&sub_id, ConfirmationKind::Manual).await.expect("Error confirming delivery");
        assert!(confirmed);
        let (_, confirmed) =
            api.confirm_delivery(&sub_id, ConfirmationKind::Manual).await.expect("Error re-confirming delivery");
        assert!(!confirmed);

        // now the status check flips it
        let outcome = releases.evaluate(&sub_id).await.expect("Error evaluating release");
        assert!(outcome.became_ready);
        assert_eq!(outcome.release.status, ReleaseStatus::Ready);
        assert!(outcome.release.conditions.delivery_confirmed);

        // evaluating a release that is already Ready is a no-op
        let outcome = releases.evaluate(&sub_id).await.expect("Error re-evaluating release");
        assert!(!outcome.became_ready);
        assert_eq!(outcome.release.status, ReleaseStatus::Ready);

        // a fresh order is complete on conditions but still inside its hold window
        let order = single_store_order("order-204", "store-203", 30_000, 1_000, Utc::now());
        let sub_id = order.sub_orders[0].sub_order_id.clone();
        let _ = api.process_new_order(order).await.expect("Error inserting order");
        let _ = api.process_payment_cleared(&OrderId::new("order-204")).await.expect("Error clearing payment");
        let _ = api
            .update_delivery_status(&sub_id, DeliveryStatus::Delivered, None)
            .await
            .expect("Error marking delivered");
        let _ = api.confirm_delivery(&sub_id, ConfirmationKind::Manual).await.expect("Error confirming delivery");
        let outcome = releases.evaluate(&sub_id).await.expect("Error evaluating release");
        assert!(!outcome.became_ready);
        assert_eq!(outcome.release.status, ReleaseStatus::Pending);
        assert!(outcome.release.conditions_met());
        assert!(!outcome.release.is_due(Utc::now()));
        tear_down(db, &url).await;
    });
}

#[test]
fn release_pays_the_store_exactly_once() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-205", "Enugu Gallery").await.expect("Error registering store");
        let order = single_store_order("order-205", "store-205", 200_000, 5_000, Utc::now() - Duration::days(21));
        let sub_id = make_ready(&api, &releases, order).await;

        let outcome = releases.release(&sub_id, "ops@marketplace.example").await.expect("Error releasing funds");
        let (release, entry) = match outcome {
            ReleaseOutcome::Released { release, transaction } => (release, transaction),
            other => panic!("Expected a fresh payout, got {other:?}"),
        };
        assert_eq!(release.status, ReleaseStatus::Released);
        assert!(release.released_at.is_some());
        assert_eq!(release.trigger_kind, Some(ReleaseTrigger::AdminApproved));
        assert_eq!(release.released_by.as_deref(), Some("ops@marketplace.example"));
        assert_eq!(entry.amount, Money::from(178_000));
        assert_eq!(entry.source, TransactionSource::Order);

        let wallet = db.fetch_wallet("store-205").await.expect("Error fetching wallet").unwrap();
        assert_eq!(wallet.balance, Money::from(178_000));
        assert!(wallet.pending.is_zero());
        assert_eq!(wallet.total_earned, Money::from(178_000));

        // releasing again reports the original payout instead of crediting twice
        let outcome = releases.release(&sub_id, "ops@marketplace.example").await.expect("Error re-releasing funds");
        match outcome {
            ReleaseOutcome::AlreadyReleased { release, transaction } => {
                assert_eq!(release.status, ReleaseStatus::Released);
                let tx = transaction.expect("The original ledger entry should be attached");
                assert_eq!(tx.amount, Money::from(178_000));
            },
            other => panic!("Expected AlreadyReleased, got {other:?}"),
        }
        let wallet = db.fetch_wallet("store-205").await.expect("Error fetching wallet").unwrap();
        assert_eq!(wallet.balance, Money::from(178_000));
        let history = db.wallet_history("store-205").await.expect("Error fetching history");
        let order_credits = history.iter().filter(|t| t.source == TransactionSource::Order).count();
        assert_eq!(order_credits, 1);
        tear_down(db, &url).await;
    });
}

#[test]
fn racing_releases_credit_the_store_exactly_once() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-220", "Kano Leatherworks").await.expect("Error registering store");
        let order = single_store_order("order-220", "store-220", 90_000, 2_500, Utc::now() - Duration::days(21));
        let sub_id = make_ready(&api, &releases, order).await;

        let mut workers = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            let sub_id = sub_id.clone();
            workers.push(tokio::spawn(async move {
                let racer = ReleaseApi::new(db, EventProducers::default());
                racer.release(&sub_id, "ops@marketplace.example").await
            }));
        }
        let mut fresh = 0;
        for worker in workers {
            match worker.await.expect("Release task panicked") {
                Ok(ReleaseOutcome::Released { .. }) => fresh += 1,
                // losers either report the winner's payout or lose the row lock outright
                Ok(ReleaseOutcome::AlreadyReleased { .. }) => {},
                Err(SettlementError::ConcurrencyConflict(_)) => {},
                other => panic!("Unexpected outcome from a racing release: {other:?}"),
            }
        }
        assert_eq!(fresh, 1);

        let history = db.wallet_history("store-220").await.expect("Error fetching history");
        let credits = history.iter().filter(|t| t.source == TransactionSource::Order).collect::<Vec<_>>();
        assert_eq!(credits.len(), 1);
        let wallet = db.fetch_wallet("store-220").await.expect("Error fetching wallet").unwrap();
        assert_eq!(wallet.balance, credits[0].amount);
        assert!(wallet.pending.is_zero());
        tear_down(db, &url).await;
    });
}

#[test]
fn failed_releases_retry_back_to_ready() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-206", "Kaduna Spices").await.expect("Error registering store");
        let order = single_store_order("order-206", "store-206", 80_000, 2_000, Utc::now() - Duration::days(21));
        let sub_id = make_ready(&api, &releases, order).await;
        let payout = releases.fetch(&sub_id).await.expect("Error fetching release").unwrap().settlement.payout();

        let failed = releases.fail(&sub_id, "payout rail timed out").await.expect("Error failing release");
        assert_eq!(failed.status, ReleaseStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("payout rail timed out"));
        let wallet = db.fetch_wallet("store-206").await.expect("Error fetching wallet").unwrap();
        assert!(wallet.pending.is_zero());

        let retried = releases.retry(&sub_id).await.expect("Error retrying release");
        assert_eq!(retried.status, ReleaseStatus::Ready);
        let wallet = db.fetch_wallet("store-206").await.expect("Error fetching wallet").unwrap();
        assert_eq!(wallet.pending, payout);

        let outcome = releases.release(&sub_id, "ops").await.expect("Error releasing funds");
        assert!(outcome.is_new());
        let wallet = db.fetch_wallet("store-206").await.expect("Error fetching wallet").unwrap();
        assert_eq!(wallet.balance, payout);
        assert!(wallet.pending.is_zero());
        tear_down(db, &url).await;
    });
}

#[test]
fn an_order_refund_cancels_unreleased_settlements() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-207", "Abuja Books").await.expect("Error registering store");
        let order = single_store_order("order-207", "store-207", 40_000, 1_000, Utc::now());
        let sub_id = order.sub_orders[0].sub_order_id.clone();
        let _ = api.process_new_order(order).await.expect("Error inserting order");
        let _ = api.process_payment_cleared(&OrderId::new("order-207")).await.expect("Error clearing payment");
        let wallet = db.fetch_wallet("store-207").await.expect("Error fetching wallet").unwrap();
        assert!(!wallet.pending.is_zero());

        let refunded = api.process_payment_refunded(&OrderId::new("order-207")).await.expect("Error refunding order");
        assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
        let release = releases.fetch(&sub_id).await.expect("Error fetching release").unwrap();
        assert_eq!(release.status, ReleaseStatus::Failed);
        let wallet = db.fetch_wallet("store-207").await.expect("Error fetching wallet").unwrap();
        assert!(wallet.pending.is_zero());

        // the cancelled settlement cannot sneak back in through a retry
        let err = releases.retry(&sub_id).await.expect_err("Retry on a refunded order should fail");
        assert!(matches!(err, SettlementError::ValidationError(_)));

        // refunding twice is a no-op
        let again = api.process_payment_refunded(&OrderId::new("order-207")).await.expect("Error re-refunding order");
        assert_eq!(again.payment_status, PaymentStatus::Refunded);
        tear_down(db, &url).await;
    });
}

#[test]
fn a_refunded_return_claws_back_a_released_payout() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-208", "Oyo Pottery").await.expect("Error registering store");
        let order = single_store_order("order-208", "store-208", 80_000, 2_000, Utc::now() - Duration::days(21));
        let sub_id = make_ready(&api, &releases, order).await;
        let _ = releases.release(&sub_id, "ops").await.expect("Error releasing funds");
        let payout = releases.fetch(&sub_id).await.expect("Error fetching release").unwrap().settlement.payout();

        let request = api.request_return(&sub_id, "cracked on arrival").await.expect("Error opening return");
        assert_eq!(request.status, ReturnStatus::Requested);
        // returns cannot jump straight to Received
        let err = api
            .update_return_status(request.id, ReturnStatus::Received)
            .await
            .expect_err("Requested cannot jump to Received");
        assert!(matches!(err, SettlementError::InvalidStateTransition { .. }));

        for status in [ReturnStatus::Approved, ReturnStatus::InTransit, ReturnStatus::Received] {
            let _ = api.update_return_status(request.id, status).await.expect("Error advancing return");
        }
        let update = api.update_return_status(request.id, ReturnStatus::Refunded).await.expect("Error refunding return");
        assert_eq!(update.request.status, ReturnStatus::Refunded);
        assert_eq!(update.request.refund_amount, Some(payout));
        let refund = update.refund.expect("A released payout must be clawed back");
        assert_eq!(refund.amount, payout);
        assert_eq!(refund.source, TransactionSource::Refund);

        let wallet = db.fetch_wallet("store-208").await.expect("Error fetching wallet").unwrap();
        assert!(wallet.balance.is_zero());
        // the release record itself stays Released; the clawback is a ledger event
        let release = releases.fetch(&sub_id).await.expect("Error fetching release").unwrap();
        assert_eq!(release.status, ReleaseStatus::Released);
        tear_down(db, &url).await;
    });
}

#[test]
fn a_refunded_return_cancels_an_unreleased_settlement() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-209", "Benin Bronzeworks").await.expect("Error registering store");
        let order = single_store_order("order-209", "store-209", 40_000, 1_000, Utc::now());
        let sub_id = order.sub_orders[0].sub_order_id.clone();
        let _ = api.process_new_order(order).await.expect("Error inserting order");
        let _ = api.process_payment_cleared(&OrderId::new("order-209")).await.expect("Error clearing payment");

        let request = api.request_return(&sub_id, "wrong colour").await.expect("Error opening return");
        for status in [ReturnStatus::Approved, ReturnStatus::InTransit, ReturnStatus::Received] {
            let _ = api.update_return_status(request.id, status).await.expect("Error advancing return");
        }
        let update = api.update_return_status(request.id, ReturnStatus::Refunded).await.expect("Error refunding return");
        // nothing was ever paid out, so there is nothing to claw back
        assert!(update.refund.is_none());
        let release = releases.fetch(&sub_id).await.expect("Error fetching release").unwrap();
        assert_eq!(release.status, ReleaseStatus::Failed);
        let wallet = db.fetch_wallet("store-209").await.expect("Error fetching wallet").unwrap();
        assert!(wallet.pending.is_zero());
        assert!(wallet.balance.is_zero());
        tear_down(db, &url).await;
    });
}

#[test]
fn reversal_compensates_a_released_payout() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-210", "Calabar Crafts").await.expect("Error registering store");
        let order = single_store_order("order-210", "store-210", 80_000, 2_000, Utc::now() - Duration::days(21));
        let sub_id = make_ready(&api, &releases, order).await;
        let _ = releases.release(&sub_id, "ops").await.expect("Error releasing funds");
        let payout = releases.fetch(&sub_id).await.expect("Error fetching release").unwrap().settlement.payout();

        let (release, entry) = releases
            .reverse(&sub_id, "duplicate shipment detected", "cfo@marketplace.example")
            .await
            .expect("Error reversing release");
        assert_eq!(release.status, ReleaseStatus::Reversed);
        assert!(release.reversed_at.is_some());
        assert_eq!(release.reversal_reason.as_deref(), Some("duplicate shipment detected"));
        assert_eq!(entry.amount, payout);
        assert_eq!(entry.source, TransactionSource::Adjustment);
        let wallet = db.fetch_wallet("store-210").await.expect("Error fetching wallet").unwrap();
        assert!(wallet.balance.is_zero());
        assert!(wallet.total_earned.is_zero());

        let err = releases.reverse(&sub_id, "again", "cfo").await.expect_err("Double reversal should fail");
        assert!(matches!(err, SettlementError::InvalidStateTransition { .. }));

        // a payout the store has already spent cannot be reversed
        let order = single_store_order("order-211", "store-210", 80_000, 2_000, Utc::now() - Duration::days(21));
        let sub_id = make_ready(&api, &releases, order).await;
        let _ = releases.release(&sub_id, "ops").await.expect("Error releasing funds");
        let _ = db
            .debit_wallet("store-210", payout, TransactionSource::Withdrawal, None, None)
            .await
            .expect("Error draining wallet");
        let err = releases.reverse(&sub_id, "chargeback", "cfo").await.expect_err("Reversal should fail");
        assert!(matches!(err, SettlementError::WalletError(WalletLedgerError::InsufficientFunds { .. })));
        let release = releases.fetch(&sub_id).await.expect("Error fetching release").unwrap();
        assert_eq!(release.status, ReleaseStatus::Released);
        tear_down(db, &url).await;
    });
}

#[test]
fn force_release_pays_out_regardless_of_schedule() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-212", "Makurdi Farms").await.expect("Error registering store");
        // just placed and never delivered, so neither the schedule nor the conditions are met
        let order = single_store_order("order-212", "store-212", 50_000, 1_500, Utc::now());
        let sub_id = order.sub_orders[0].sub_order_id.clone();
        let _ = api.process_new_order(order).await.expect("Error inserting order");
        let _ = api.process_payment_cleared(&OrderId::new("order-212")).await.expect("Error clearing payment");

        let outcome = releases.force_release(&sub_id, "root@marketplace.example").await.expect("Error forcing release");
        assert!(outcome.is_new());
        let release = outcome.release();
        assert_eq!(release.status, ReleaseStatus::Released);
        assert_eq!(release.trigger_kind, Some(ReleaseTrigger::AdminForced));
        let wallet = db.fetch_wallet("store-212").await.expect("Error fetching wallet").unwrap();
        assert_eq!(wallet.balance, release.settlement.payout());
        assert!(wallet.pending.is_zero());
        tear_down(db, &url).await;
    });
}

#[test]
fn dispute_checks_block_release_when_the_policy_requires_them() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        // a stricter Standard policy version that insists on dispute checks
        sqlx::query(
            r#"INSERT INTO release_policies (store_tier, version, percentage_fee, flat_fee, business_days_required,
            delivery_required, buyer_protection_days, require_buyer_protection, require_dispute_checks)
            VALUES ('Standard', 2, 750, 10000, 2, 1, 7, 0, 1)"#,
        )
        .execute(db.pool())
        .await
        .expect("Error seeding policy");

        let _ = api.register_store("store-213", "Port Harcourt Audio").await.expect("Error registering store");
        let order = single_store_order("order-213", "store-213", 80_000, 2_000, Utc::now() - Duration::days(21));
        let sub_id = order.sub_orders[0].sub_order_id.clone();
        let _ = api.process_new_order(order).await.expect("Error inserting order");
        let (_, created) = api.process_payment_cleared(&OrderId::new("order-213")).await.expect("Error clearing payment");
        assert!(created[0].rules.require_dispute_checks);

        let _ = api
            .update_delivery_status(&sub_id, DeliveryStatus::Delivered, None)
            .await
            .expect("Error marking delivered");
        let _ = api.confirm_delivery(&sub_id, ConfirmationKind::Manual).await.expect("Error confirming delivery");

        let request = api.request_return(&sub_id, "item not as described").await.expect("Error opening return");
        let dispute = api
            .open_dispute(&sub_id, DisputeKind::Dispute, "buyer claims non-delivery")
            .await
            .expect("Error opening dispute");

        let outcome = releases.evaluate(&sub_id).await.expect("Error evaluating release");
        assert!(!outcome.became_ready);
        let unmet = outcome.release.unmet_conditions();
        assert!(unmet.contains(&"no_active_returns"));
        assert!(unmet.contains(&"no_active_disputes"));

        let _ = api.update_return_status(request.id, ReturnStatus::Rejected).await.expect("Error rejecting return");
        let outcome = releases.evaluate(&sub_id).await.expect("Error evaluating release");
        assert!(!outcome.became_ready, "the open dispute should still block the payout");
        assert!(outcome.release.conditions.no_active_returns);

        let _ = api.resolve_dispute(dispute.id).await.expect("Error resolving dispute");
        let outcome = releases.evaluate(&sub_id).await.expect("Error evaluating release");
        assert!(outcome.became_ready);
        assert_eq!(outcome.release.status, ReleaseStatus::Ready);
        tear_down(db, &url).await;
    });
}

#[test]
fn delivered_orders_auto_confirm_after_the_grace_window() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-214", "Zaria Leather").await.expect("Error registering store");

        let stale = single_store_order("order-214", "store-214", 40_000, 1_000, Utc::now() - Duration::days(21));
        let stale_sub = stale.sub_orders[0].sub_order_id.clone();
        let fresh = single_store_order("order-215", "store-214", 30_000, 1_000, Utc::now() - Duration::days(21));
        let fresh_sub = fresh.sub_orders[0].sub_order_id.clone();
        for order in [stale, fresh] {
            let id = order.order_id.clone();
            let _ = api.process_new_order(order).await.expect("Error inserting order");
            let _ = api.process_payment_cleared(&id).await.expect("Error clearing payment");
        }
        for sub in [&stale_sub, &fresh_sub] {
            let _ = api.update_delivery_status(sub, DeliveryStatus::Delivered, None).await.expect("Error delivering");
        }
        // backdate one delivery past the grace window
        sqlx::query("UPDATE sub_orders SET delivered_at = $1 WHERE sub_order_id = $2")
            .bind(Utc::now() - Duration::days(10))
            .bind(stale_sub.as_str())
            .execute(db.pool())
            .await
            .expect("Error backdating delivery");

        let confirmed = api.auto_confirm_deliveries(7, 50).await.expect("Error running auto-confirm");
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].sub_order_id, stale_sub);
        assert_eq!(confirmed[0].confirmation_kind, Some(ConfirmationKind::Auto));
        assert!(confirmed[0].customer_confirmed);

        let release = releases.fetch(&stale_sub).await.expect("Error fetching release").unwrap();
        assert!(release.conditions.delivery_confirmed);
        let release = releases.fetch(&fresh_sub).await.expect("Error fetching release").unwrap();
        assert!(!release.conditions.delivery_confirmed);

        // a second sweep finds nothing left to confirm
        let confirmed = api.auto_confirm_deliveries(7, 50).await.expect("Error re-running auto-confirm");
        assert!(confirmed.is_empty());
        tear_down(db, &url).await;
    });
}

#[test]
fn the_scheduled_sweep_pays_out_whatever_is_due() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-216", "Owerri Gadgets").await.expect("Error registering store");
        let _ = api.register_store("store-217", "Sokoto Dates").await.expect("Error registering store");

        // one store has a confirmed delivery, the other never shipped
        let done = single_store_order("order-216", "store-216", 80_000, 2_000, Utc::now() - Duration::days(21));
        let done_sub = done.sub_orders[0].sub_order_id.clone();
        let _ = api.process_new_order(done).await.expect("Error inserting order");
        let _ = api.process_payment_cleared(&OrderId::new("order-216")).await.expect("Error clearing payment");
        let _ = api
            .update_delivery_status(&done_sub, DeliveryStatus::Delivered, None)
            .await
            .expect("Error marking delivered");
        let _ = api.confirm_delivery(&done_sub, ConfirmationKind::Manual).await.expect("Error confirming delivery");

        let stuck = single_store_order("order-217", "store-217", 50_000, 1_500, Utc::now() - Duration::days(21));
        let stuck_sub = stuck.sub_orders[0].sub_order_id.clone();
        let _ = api.process_new_order(stuck).await.expect("Error inserting order");
        let _ = api.process_payment_cleared(&OrderId::new("order-217")).await.expect("Error clearing payment");

        let summary = releases.run_scheduled_sweep(50).await.expect("Error running sweep");
        assert_eq!(summary.became_ready, 1);
        assert_eq!(summary.released, 1);
        assert_eq!(summary.failures, 0);

        let release = releases.fetch(&done_sub).await.expect("Error fetching release").unwrap();
        assert_eq!(release.status, ReleaseStatus::Released);
        assert_eq!(release.trigger_kind, Some(ReleaseTrigger::ScheduledSweep));
        let wallet = db.fetch_wallet("store-216").await.expect("Error fetching wallet").unwrap();
        assert_eq!(wallet.balance, release.settlement.payout());

        let release = releases.fetch(&stuck_sub).await.expect("Error fetching release").unwrap();
        assert_eq!(release.status, ReleaseStatus::Pending);
        let wallet = db.fetch_wallet("store-217").await.expect("Error fetching wallet").unwrap();
        assert!(wallet.balance.is_zero());
        assert_eq!(wallet.pending, release.settlement.payout());
        tear_down(db, &url).await;
    });
}

#[test]
fn the_evaluation_sweep_flips_but_pays_nothing() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let releases = ReleaseApi::new(db.clone(), EventProducers::default());
        let _ = api.register_store("store-230", "Gwagwalada Furniture").await.expect("Error registering store");

        let order = single_store_order("order-230", "store-230", 64_000, 1_800, Utc::now() - Duration::days(21));
        let sub_id = order.sub_orders[0].sub_order_id.clone();
        let _ = api.process_new_order(order).await.expect("Error inserting order");
        let _ = api.process_payment_cleared(&OrderId::new("order-230")).await.expect("Error clearing payment");
        let _ = api
            .update_delivery_status(&sub_id, DeliveryStatus::Delivered, None)
            .await
            .expect("Error marking delivered");
        let _ = api.confirm_delivery(&sub_id, ConfirmationKind::Manual).await.expect("Error confirming delivery");

        let summary = releases.run_evaluation_sweep(50).await.expect("Error running evaluation sweep");
        assert_eq!(summary.evaluated, 1);
        assert_eq!(summary.became_ready, 1);
        assert_eq!(summary.released, 0);

        // ready for an operator, but no money has moved
        let release = releases.fetch(&sub_id).await.expect("Error fetching release").unwrap();
        assert_eq!(release.status, ReleaseStatus::Ready);
        let wallet = db.fetch_wallet("store-230").await.expect("Error fetching wallet").unwrap();
        assert!(wallet.balance.is_zero());
        assert_eq!(wallet.pending, release.settlement.payout());
        tear_down(db, &url).await;
    });
}

#[test]
fn multi_store_orders_split_by_sub_order() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (url, db) = setup().await;
        let api = OrderFlowApi::new(db.clone(), EventProducers::default());
        let ledger = settlement_engine::LedgerApi::new(db.clone());
        let _ = api.register_store("store-218", "Lokoja Grains").await.expect("Error registering store");
        let _ = api.register_store("store-219", "Asaba Prints").await.expect("Error registering store");

        let subs = vec![
            NewSubOrder {
                sub_order_id: SubOrderId::new("order-218-1"),
                store_id: "store-218".to_string(),
                total_amount: Money::from(100_000),
                shipping_price: Money::from(2_000),
                items: vec![NewLineItem {
                    product: ProductRef::Physical("SKU-0101".to_string()),
                    product_name: "Ofada rice, 5kg".to_string(),
                    unit_price: Money::from(50_000),
                    quantity: 2,
                    line_total: Money::from(100_000),
                }],
            },
            NewSubOrder {
                sub_order_id: SubOrderId::new("order-218-2"),
                store_id: "store-219".to_string(),
                total_amount: Money::from(50_000),
                shipping_price: Money::from(1_000),
                items: vec![NewLineItem {
                    product: ProductRef::Digital("SKU-0202".to_string()),
                    product_name: "Ankara pattern pack".to_string(),
                    unit_price: Money::from(50_000),
                    quantity: 1,
                    line_total: Money::from(50_000),
                }],
            },
        ];
        let order = NewOrder {
            order_id: OrderId::new("order-218"),
            idempotency_key: "checkout-order-218".to_string(),
            customer_id: "cust-77".to_string(),
            buyer_name: "Chiedo Okafor".to_string(),
            buyer_email: "chiedo@example.com".to_string(),
            shipping_address: "3 Ring Road, Ibadan".to_string(),
            memo: Some("gift wrap please".to_string()),
            total_amount: Money::from(153_000),
            placed_at: Utc::now(),
            sub_orders: subs,
        };
        let _ = api.process_new_order(order).await.expect("Error inserting order");
        let (_, created) = api.process_payment_cleared(&OrderId::new("order-218")).await.expect("Error clearing payment");
        assert_eq!(created.len(), 2);

        // each store's escrow holds exactly its own sub-order's payout
        let wallet = db.fetch_wallet("store-218").await.expect("Error fetching wallet").unwrap();
        assert_eq!(wallet.pending, Money::from(83_500));
        let wallet = db.fetch_wallet("store-219").await.expect("Error fetching wallet").unwrap();
        assert_eq!(wallet.pending, Money::from(36_750));

        let full = ledger
            .fetch_full_order(&OrderId::new("order-218"))
            .await
            .expect("Error fetching full order")
            .expect("Order should exist");
        assert_eq!(full.sub_orders.len(), 2);
        let total: Money = full.sub_orders.iter().map(|s| s.sub_order.gross_value()).sum();
        assert_eq!(total, full.order.total_amount);
        tear_down(db, &url).await;
    });
}
