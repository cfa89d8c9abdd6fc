//! JWT access tokens for the back-office API.
//!
//! Admin users authenticate once against `POST /auth` with their username and API key, and
//! receive a short-lived access token signed with the server's `MSL_JWT_SECRET`. Every request
//! under `/api` carries the token as a `Authorization: Bearer ...` header; the
//! [`JwtMiddleware`](crate::middleware::JwtMiddlewareFactory) validates it and stashes the
//! [`JwtClaims`] in the request extensions for the ACL layer and the handlers.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use settlement_engine::db_types::Roles;

use crate::{config::AuthConfig, errors::{AuthError, ServerError}};

/// The claims carried inside an access token. `sub` is the admin username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub roles: Roles,
    pub iat: i64,
    pub exp: i64,
}

impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<JwtClaims>().cloned();
        ready(claims.ok_or(ServerError::CouldNotDeserializeAuthToken))
    }
}

/// Pulls the bearer token out of the `Authorization` header, if there is one.
pub fn extract_bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
}

/// Signs and verifies access tokens. Cheap to clone; each worker keeps its own copy.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    default_lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.reveal().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            default_lifetime: Duration::hours(config.token_lifetime_hours),
        }
    }

    /// Issue a new access token for `username` with the given roles. The configured lifetime
    /// applies unless the caller overrides it.
    ///
    /// This method DOES NOT verify that the user holds those roles. That must be done prior to
    /// calling `issue_token`.
    pub fn issue_token(&self, username: &str, roles: Roles, duration: Option<Duration>) -> Result<String, AuthError> {
        let now = Utc::now();
        let lifetime = duration.unwrap_or(self.default_lifetime);
        let claims =
            JwtClaims { sub: username.to_string(), roles, iat: now.timestamp(), exp: (now + lifetime).timestamp() };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AuthError::ValidationError(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp"]);
        let data = decode::<JwtClaims>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature => AuthError::ValidationError("The token signature is invalid".to_string()),
            ErrorKind::InvalidToken => AuthError::PoorlyFormattedToken(e.to_string()),
            _ => AuthError::ValidationError(e.to_string()),
        })?;
        Ok(data.claims)
    }
}
