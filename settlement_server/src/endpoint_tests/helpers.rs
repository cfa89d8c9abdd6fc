use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use chrono::Duration;
use log::debug;
use settlement_engine::db_types::Roles;

use crate::{auth::TokenIssuer, config::AuthConfig, middleware::JwtMiddlewareFactory};

// Creates a test `AuthConfig` for issuing tokens. DO NOT re-use this secret anywhere.
pub fn get_auth_config() -> AuthConfig {
    AuthConfig::new("endpoint-test-signing-secret-0123456789")
}

pub fn issue_token(username: &str, roles: Roles, lifetime: Duration) -> String {
    let signer = TokenIssuer::new(&get_auth_config());
    signer.issue_token(username, roles, Some(lifetime)).expect("Failed to sign token")
}

/// Fires a GET request at an app consisting of the JWT middleware plus whatever `configure`
/// registers. Middleware rejections surface as `Err(message)`, handler responses as
/// `Ok((status, body))`.
pub async fn get_request(
    auth_header: &str,
    path: &str,
    configure: fn(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    let mut req = TestRequest::get().uri(path);
    if !auth_header.is_empty() {
        req = req.insert_header(("Authorization", format!("Bearer {auth_header}")));
    }
    let req = req.to_request();
    let signer = TokenIssuer::new(&get_auth_config());
    let app = App::new().wrap(JwtMiddlewareFactory::new(signer)).configure(configure);

    let service = test::init_service(app).await;
    debug!("Making request");
    let (_, res) = test::try_call_service(&service, req).await.map_err(|e| e.to_string())?.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    Ok((status, body))
}
