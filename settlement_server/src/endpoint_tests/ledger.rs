use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, TimeZone, Utc};
use msl_common::Money;
use settlement_engine::{
    db_types::{Order, OrderId, PaymentStatus, Role},
    LedgerApi,
};

use super::helpers::{get_request, issue_token};
use crate::{
    endpoint_tests::mocks::MockLedgerManager,
    routes::{OrderByIdRoute, OrdersSearchRoute},
};

#[actix_web::test]
async fn fetch_order_by_id() {
    let _ = env_logger::try_init().ok();
    let token = issue_token("skye", vec![Role::ReadOnly], Duration::hours(1));
    let (status, body) = get_request(&token, "/order/msl-1001", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body, serde_json::to_value(test_order()).unwrap());
}

#[actix_web::test]
async fn fetch_unknown_order() {
    let _ = env_logger::try_init().ok();
    let token = issue_token("skye", vec![Role::ReadOnly], Duration::hours(1));
    let (status, body) = get_request(&token, "/order/msl-9999", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. No order with id msl-9999"}"#);
}

#[actix_web::test]
async fn search_orders_by_customer() {
    let _ = env_logger::try_init().ok();
    let token = issue_token("skye", vec![Role::ReadOnly], Duration::hours(1));
    let (status, body) =
        get_request(&token, "/search/orders?customer_id=cust-77", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body, serde_json::to_value(vec![test_order()]).unwrap());
}

#[actix_web::test]
async fn search_orders_rejects_unknown_filter_fields() {
    let _ = env_logger::try_init().ok();
    let token = issue_token("skye", vec![Role::ReadOnly], Duration::hours(1));
    let (status, _body) =
        get_request(&token, "/search/orders?shoes=large", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn search_orders_requires_read_role() {
    let _ = env_logger::try_init().ok();
    let token = issue_token("skye", vec![Role::Write], Duration::hours(1));
    let err = get_request(&token, "/search/orders?customer_id=cust-77", configure).await.expect_err("Expected error");
    assert_eq!(err, "Insufficient permissions");
}

fn test_order() -> Order {
    let ts = Utc.with_ymd_and_hms(2024, 7, 1, 9, 30, 0).unwrap();
    Order {
        id: 1,
        order_id: OrderId::from("msl-1001"),
        idempotency_key: "idem-1001".into(),
        customer_id: "cust-77".into(),
        buyer_name: "Jordan Osei".into(),
        buyer_email: "jordan@example.com".into(),
        shipping_address: "12 Harbour Way, Cape Town".into(),
        memo: None,
        currency: "USD".into(),
        total_amount: Money::from(5500),
        payment_status: PaymentStatus::Paid,
        placed_at: ts,
        created_at: ts,
        updated_at: ts,
    }
}

fn configure(cfg: &mut ServiceConfig) {
    let mut ledger_manager = MockLedgerManager::new();
    ledger_manager.expect_fetch_order().returning(|order_id| match order_id.as_str() {
        "msl-1001" => Ok(Some(test_order())),
        _ => Ok(None),
    });
    ledger_manager
        .expect_search_orders()
        .withf(|query| query.customer_id.as_deref() == Some("cust-77"))
        .returning(|_| Ok(vec![test_order()]));
    let api = LedgerApi::new(ledger_manager);
    cfg.service(OrderByIdRoute::<MockLedgerManager>::new())
        .service(OrdersSearchRoute::<MockLedgerManager>::new())
        .app_data(web::Data::new(api));
}
