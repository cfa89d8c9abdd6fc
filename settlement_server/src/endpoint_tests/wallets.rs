use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, TimeZone, Utc};
use msl_common::Money;
use settlement_engine::{
    db_types::{Role, Wallet},
    WalletApi,
};

use super::helpers::{get_request, issue_token};
use crate::{
    endpoint_tests::mocks::MockWalletManager,
    routes::{WalletBalanceRoute, WalletHistoryRoute},
};

#[actix_web::test]
async fn fetch_balance_no_token() {
    let _ = env_logger::try_init().ok();
    let err = get_request("", "/wallet/acme-stores/balance", configure).await.expect_err("Expected error");
    assert_eq!(err, "Authentication Error. No access token was provided.");
}

#[actix_web::test]
async fn fetch_balance_expired_token() {
    let _ = env_logger::try_init().ok();
    let token = issue_token("skye", vec![Role::ReadOnly], Duration::hours(-2));
    let err = get_request(&token, "/wallet/acme-stores/balance", configure).await.expect_err("Expected error");
    assert_eq!(err, "Authentication Error. The access token has expired.");
}

#[actix_web::test]
async fn fetch_balance() {
    let _ = env_logger::try_init().ok();
    let token = issue_token("skye", vec![Role::ReadOnly], Duration::hours(1));
    let (status, body) = get_request(&token, "/wallet/acme-stores/balance", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body, serde_json::to_value(test_wallet()).unwrap());
}

#[actix_web::test]
async fn fetch_balance_without_read_role() {
    let _ = env_logger::try_init().ok();
    let token = issue_token("skye", vec![Role::Write], Duration::hours(1));
    let err = get_request(&token, "/wallet/acme-stores/balance", configure).await.expect_err("Expected error");
    assert_eq!(err, "Insufficient permissions");
}

#[actix_web::test]
async fn balance_for_unknown_store() {
    let _ = env_logger::try_init().ok();
    let token = issue_token("skye", vec![Role::ReadOnly], Duration::hours(1));
    let (status, body) = get_request(&token, "/wallet/ghost-mart/balance", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. No wallet exists for store ghost-mart"}"#);
}

#[actix_web::test]
async fn fetch_history_for_store_with_no_entries() {
    let _ = env_logger::try_init().ok();
    let token = issue_token("skye", vec![Role::ReadOnly], Duration::hours(1));
    let (status, body) = get_request(&token, "/wallet/acme-stores/history", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

fn test_wallet() -> Wallet {
    let ts = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap();
    Wallet {
        id: 1,
        store_id: "acme-stores".into(),
        currency: "USD".into(),
        balance: Money::from(125_000),
        pending: Money::from(40_000),
        total_earned: Money::from(310_000),
        created_at: ts,
        updated_at: ts,
    }
}

fn configure(cfg: &mut ServiceConfig) {
    let mut wallet_manager = MockWalletManager::new();
    wallet_manager.expect_fetch_wallet().returning(|store_id| match store_id {
        "acme-stores" => Ok(Some(test_wallet())),
        _ => Ok(None),
    });
    wallet_manager.expect_wallet_history().returning(|_| Ok(vec![]));
    let api = WalletApi::new(wallet_manager);
    cfg.service(WalletBalanceRoute::<MockWalletManager>::new())
        .service(WalletHistoryRoute::<MockWalletManager>::new())
        .app_data(web::Data::new(api));
}
