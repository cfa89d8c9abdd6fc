use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use chrono::Utc;
use log::*;
use serde_json::json;
use settlement_engine::{
    db_types::{AdminUser, Role, Roles},
    helpers::hash_api_key,
    AuthApi,
};

use super::mocks::MockAuthManager;
use crate::{auth::TokenIssuer, endpoint_tests::helpers::get_auth_config, routes::AuthRoute};

const API_KEY: &str = "the-correct-api-key-1234567890";

#[actix_web::test]
async fn login_without_body() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::post().uri("/auth").to_request();
    let app = App::new().configure(configure_app(None, vec![]));
    let app = test::init_service(app).await;
    let (_req, res) = test::call_service(&app, req).await.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    info!("Response body: {body}");
    assert!(status.is_client_error(), "was: {status}");
}

#[actix_web::test]
async fn login_with_unknown_admin() {
    let _ = env_logger::try_init().ok();
    let body = json!({"username": "nobody", "api_key": API_KEY});
    let (status, body) = post_request(body, configure_app(None, vec![])).await;
    assert_eq!(status.as_u16(), StatusCode::FORBIDDEN.as_u16());
    assert_eq!(body, r#"{"error":"Authentication Error. Admin account not found."}"#);
}

#[actix_web::test]
async fn login_with_wrong_api_key() {
    let _ = env_logger::try_init().ok();
    let body = json!({"username": "skye", "api_key": "not-the-right-key-at-all-000000"});
    let (status, body) = post_request(body, configure_app(Some(admin_user()), vec![])).await;
    assert_eq!(status.as_u16(), StatusCode::UNAUTHORIZED.as_u16());
    assert_eq!(body, r#"{"error":"Authentication Error. Access token is invalid. The provided API key is not valid"}"#);
}

#[actix_web::test]
async fn login_with_valid_credentials() {
    let _ = env_logger::try_init().ok();
    let body = json!({"username": "skye", "api_key": API_KEY});
    let roles = vec![Role::ReadOnly, Role::Write];
    let (status, token) = post_request(body, configure_app(Some(admin_user()), roles.clone())).await;
    assert!(status.is_success(), "was: {status}, body: {token}");
    let signer = TokenIssuer::new(&get_auth_config());
    let claims = signer.validate_token(&token).expect("Token did not validate");
    assert_eq!(claims.sub, "skye");
    assert_eq!(claims.roles, roles);
    assert_eq!(claims.exp - claims.iat, 24 * 3600);
}

fn admin_user() -> AdminUser {
    let now = Utc::now();
    AdminUser { id: 1, username: "skye".into(), api_key_hash: hash_api_key(API_KEY), created_at: now, updated_at: now }
}

fn configure_app(admin: Option<AdminUser>, roles: Roles) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let mut auth_manager = MockAuthManager::new();
        auth_manager.expect_fetch_admin_user().returning(move |_| Ok(admin.clone()));
        auth_manager.expect_fetch_roles_for_user().returning(move |_| Ok(roles.clone()));
        let auth_api = AuthApi::new(auth_manager);
        let jwt_signer = TokenIssuer::new(&get_auth_config());
        cfg.app_data(web::Data::new(auth_api))
            .app_data(web::Data::new(jwt_signer))
            .service(AuthRoute::<MockAuthManager>::new());
    }
}

async fn post_request(body: serde_json::Value, configure: impl FnOnce(&mut ServiceConfig)) -> (StatusCode, String) {
    let req = TestRequest::post().uri("/auth").set_json(&body).to_request();
    let app = App::new().configure(configure);
    let app = test::init_service(app).await;
    debug!("Making request");
    let (_, res) = test::call_service(&app, req).await.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}
